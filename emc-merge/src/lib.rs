//! # emc-merge: Exo-MerCat identity resolution and merge engine
//!
//! Consumes normalized per-catalog planet tables and produces one
//! de-duplicated catalog in which every physical planet appears once under a
//! canonical stellar identifier, plus a structured log of every resolution
//! decision.
//!
//! ## Architecture
//!
//! - **Tier 1** (`merge::tier1`): per-catalog normalization strategies, name
//!   standardization, the external lookup capability and its retry policy
//! - **Tier 2** (`merge::tier2`): identifier resolution, binary label
//!   harmonization, fixed-point grouping and attribute consolidation
//! - **Tier 3** (`merge::tier3`): status precedence, flag accumulation and
//!   consistency checks
//!
//! `merge::pipeline::MergePipeline` wires the tiers together for one run.

pub mod error;
pub mod merge;
pub mod output;

pub use error::{MergeError, MergeResult};
