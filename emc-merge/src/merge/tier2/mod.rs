// Tier 2: Resolution, Grouping and Consolidation
//
// Each module in this tier is a "concept" with an explicit synchronization
// to the next: resolved records feed binary normalization, normalized
// records feed grouping, and converged clusters feed consolidation.
//
// Contract: modules read `SourceRecord`s through `ResolvedRecord` and never
// modify them; decisions are recorded in the `DecisionLog`.

pub mod attribute_consolidator; // Per-quantity best value selection
pub mod binary_normalizer;      // Component label harmonization
pub mod grouping_engine;        // Fixed-point planet clustering
pub mod identity_resolver;      // Canonical stellar identifiers
pub mod overrides;
pub mod resolution_cache;
