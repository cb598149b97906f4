//! Test Helper Utilities
//!
//! Shared utilities for emc-merge integration tests

#![allow(dead_code)]

pub mod mock_lookup;
pub mod records;

// Re-export commonly used items
pub use mock_lookup::MockLookup;
pub use records::{fast_retry, merge, merge_shared, planet, with_mass, with_period};
