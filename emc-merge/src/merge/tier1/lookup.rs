// Tier 1: Stellar Lookup Capability
//
// Concept: Read-only, idempotent name and position resolution against an
// external stellar database. The resolver only sees this trait, so the HTTP
// client and in-memory test doubles are interchangeable.
//
// Contract:
//   resolve(query)                        -> Ok(Some(hit)) | Ok(None) not found | Err(..)
//   resolve_by_coordinates(coords, radius) -> same, nearest object in the cone
//   resolve_survey_id(tic)                 -> same, photometric-survey target lookup
//   resolve_batch(queries)                 -> one answer per query, or one error for all

use async_trait::async_trait;
use emc_common::Coordinates;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Object found by a lookup
#[derive(Debug, Clone, PartialEq)]
pub struct LookupHit {
    pub main_id: String,
    pub coordinates: Option<Coordinates>,
    /// All identifiers the service lists for the object
    pub ids: BTreeSet<String>,
}

impl LookupHit {
    pub fn new(main_id: &str, coordinates: Option<Coordinates>) -> Self {
        Self {
            main_id: main_id.to_string(),
            coordinates,
            ids: BTreeSet::new(),
        }
    }
}

/// Lookup failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LookupError {
    #[error("lookup timed out after {0} ms")]
    Timeout(u64),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("rate limited by service (HTTP {0})")]
    RateLimited(u16),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl LookupError {
    /// Worth retrying: timeouts, network errors and throttling
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LookupError::Timeout(_) | LookupError::Transport(_) | LookupError::RateLimited(_)
        )
    }
}

pub type LookupResult = Result<Option<LookupHit>, LookupError>;

/// Answers of a batched name lookup, keyed by query
pub type BatchResult = Result<BTreeMap<String, Option<LookupHit>>, LookupError>;

/// External stellar-database lookup capability
#[async_trait]
pub trait StellarLookup: Send + Sync {
    /// Service name for logging
    fn name(&self) -> &str;

    /// Resolve a star name
    async fn resolve(&self, query: &str) -> LookupResult;

    /// Nearest object within `radius_deg` of `coordinates`
    async fn resolve_by_coordinates(&self, coordinates: Coordinates, radius_deg: f64) -> LookupResult;

    /// Resolve a TESS Input Catalog number
    async fn resolve_survey_id(&self, _tic: u64) -> LookupResult {
        Ok(None)
    }

    /// Names per `resolve_batch` call; 1 means names go one by one
    fn batch_size(&self) -> usize {
        1
    }

    /// Resolve several names at once; every query gets an entry
    async fn resolve_batch(&self, queries: &[String]) -> BatchResult {
        let mut answers = BTreeMap::new();
        for query in queries {
            answers.insert(query.clone(), self.resolve(query).await?);
        }
        Ok(answers)
    }
}

/// Lookup that never finds anything
///
/// Used for runs without network access: every record stays unresolved and
/// keeps its host as `main_id`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineLookup;

#[async_trait]
impl StellarLookup for OfflineLookup {
    fn name(&self) -> &str {
        "offline"
    }

    async fn resolve(&self, _query: &str) -> LookupResult {
        Ok(None)
    }

    async fn resolve_by_coordinates(&self, _coordinates: Coordinates, _radius_deg: f64) -> LookupResult {
        Ok(None)
    }
}
