//! In-memory stellar lookup
//!
//! Answers from fixed tables and counts every call, so tests can check what
//! the resolver asked for and how often.

use async_trait::async_trait;
use emc_common::Coordinates;
use emc_merge::merge::tier1::lookup::{BatchResult, LookupError, LookupHit, LookupResult, StellarLookup};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockLookup {
    names: BTreeMap<String, LookupHit>,
    cone_stars: Vec<LookupHit>,
    tics: BTreeMap<u64, LookupHit>,
    failing: BTreeSet<String>,
    batch_size: usize,
    calls: Mutex<BTreeMap<String, usize>>,
}

impl MockLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// `query` resolves to `main_id` at (ra, dec)
    pub fn with_star(mut self, query: &str, main_id: &str, ra: f64, dec: f64) -> Self {
        self.names.insert(
            query.to_string(),
            LookupHit::new(main_id, Some(Coordinates::new(ra, dec))),
        );
        self
    }

    /// Like `with_star`, listing extra identifiers for the object
    pub fn with_star_ids(mut self, query: &str, main_id: &str, ra: f64, dec: f64, ids: &[&str]) -> Self {
        let mut hit = LookupHit::new(main_id, Some(Coordinates::new(ra, dec)));
        hit.ids = ids.iter().map(|s| s.to_string()).collect();
        self.names.insert(query.to_string(), hit);
        self
    }

    /// Object found by cone searches around (ra, dec)
    pub fn with_cone_star(mut self, main_id: &str, ra: f64, dec: f64) -> Self {
        self.cone_stars
            .push(LookupHit::new(main_id, Some(Coordinates::new(ra, dec))));
        self
    }

    pub fn with_tic(mut self, tic: u64, main_id: &str, ra: f64, dec: f64) -> Self {
        self.tics
            .insert(tic, LookupHit::new(main_id, Some(Coordinates::new(ra, dec))));
        self
    }

    /// Every lookup of `query` fails with a transport error
    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    /// Answer names in batches of `size`
    pub fn batched(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// How many batched lookups were made
    pub fn batch_calls(&self) -> usize {
        self.calls("batch")
    }

    /// How many times a name was looked up
    pub fn calls(&self, query: &str) -> usize {
        self.calls.lock().unwrap().get(query).copied().unwrap_or(0)
    }

    fn count(&self, key: String) {
        *self.calls.lock().unwrap().entry(key).or_insert(0) += 1;
    }
}

#[async_trait]
impl StellarLookup for MockLookup {
    fn name(&self) -> &str {
        "mock"
    }

    async fn resolve(&self, query: &str) -> LookupResult {
        self.count(query.to_string());
        if self.failing.contains(query) {
            return Err(LookupError::Transport("connection reset".to_string()));
        }
        Ok(self.names.get(query).cloned())
    }

    fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    async fn resolve_batch(&self, queries: &[String]) -> BatchResult {
        self.count("batch".to_string());
        for query in queries {
            self.count(query.clone());
        }
        if queries.iter().any(|q| self.failing.contains(q)) {
            return Err(LookupError::Transport("connection reset".to_string()));
        }
        Ok(queries
            .iter()
            .map(|q| (q.clone(), self.names.get(q).cloned()))
            .collect())
    }

    async fn resolve_by_coordinates(&self, coordinates: Coordinates, radius_deg: f64) -> LookupResult {
        self.count(format!("cone {:.6} {:.6}", coordinates.ra, coordinates.dec));
        Ok(self
            .cone_stars
            .iter()
            .find(|hit| {
                hit.coordinates
                    .map(|c| c.separation_deg(&coordinates) <= radius_deg)
                    .unwrap_or(false)
            })
            .cloned())
    }

    async fn resolve_survey_id(&self, tic: u64) -> LookupResult {
        self.count(format!("TIC {}", tic));
        Ok(self.tics.get(&tic).cloned())
    }
}
