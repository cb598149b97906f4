// Exo-MerCat merge engine
//
// Three-tier architecture:
// - Tier 1: per-catalog normalization, name rules, external lookup
// - Tier 2: identifier resolution, binary labels, grouping, consolidation
// - Tier 3: status precedence, flag accumulation, consistency checks
//
// Tiers communicate only through the contracts in `types`.

pub mod decision_log;
pub mod pipeline;
pub mod tier1;
pub mod tier2;
pub mod tier3;
pub mod types;
