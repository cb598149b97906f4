// Tier 2: Forced Identifier Overrides
//
// Concept: Operator-supplied mappings from a query string to the main
// identifier it must resolve to. Overrides settle identity conflicts the
// lookup service cannot.
//
// Keys are matched after name standardization, so "Gliese 1" and "GJ 1" are
// the same key. Two keys that standardize alike but name different targets
// make the configuration contradictory.

use std::collections::BTreeMap;

use crate::error::{MergeError, MergeResult};
use crate::merge::tier1::names::standardize_name;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideTable {
    forced: BTreeMap<String, String>,
}

impl OverrideTable {
    /// Build from the `[overrides]` configuration section
    pub fn from_config(raw: &BTreeMap<String, String>) -> MergeResult<Self> {
        let mut forced: BTreeMap<String, String> = BTreeMap::new();
        for (query, target) in raw {
            let key = standardize_name(query);
            let target = target.trim().to_string();
            match forced.get(&key) {
                Some(existing) if *existing != target => {
                    return Err(MergeError::ContradictoryOverride {
                        query: key,
                        first: existing.clone(),
                        second: target,
                    });
                }
                Some(_) => {}
                None => {
                    forced.insert(key, target);
                }
            }
        }
        Ok(Self { forced })
    }

    /// Forced identifier for an already standardized query string
    pub fn get(&self, query: &str) -> Option<&str> {
        self.forced.get(query).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forced.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forced.is_empty()
    }
}
