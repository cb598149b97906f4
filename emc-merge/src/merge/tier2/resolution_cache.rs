// Tier 2: Per-Run Resolution Cache
//
// Concept: Every distinct lookup (name, TIC number or cone position) is
// issued at most once per run and its outcome kept here. The cache belongs
// to one `IdentifierResolver` and is dropped with it at the end of the run.

use emc_common::Coordinates;
use std::collections::BTreeMap;
use std::fmt;

use crate::merge::tier1::lookup::LookupHit;

/// What was asked
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    Name(String),
    Tic(u64),
    /// Cone centre in micro-degrees
    Cone { ra_udeg: i64, dec_udeg: i64 },
}

impl CacheKey {
    pub fn cone(coordinates: Coordinates) -> Self {
        CacheKey::Cone {
            ra_udeg: (coordinates.ra * 1e6).round() as i64,
            dec_udeg: (coordinates.dec * 1e6).round() as i64,
        }
    }

    pub fn cone_centre(&self) -> Option<Coordinates> {
        match self {
            CacheKey::Cone { ra_udeg, dec_udeg } => {
                Some(Coordinates::new(*ra_udeg as f64 / 1e6, *dec_udeg as f64 / 1e6))
            }
            _ => None,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Name(name) => write!(f, "name '{}'", name),
            CacheKey::Tic(tic) => write!(f, "TIC {}", tic),
            CacheKey::Cone { .. } => match self.cone_centre() {
                Some(c) => write!(f, "cone ({:.6}, {:.6})", c.ra, c.dec),
                None => write!(f, "cone"),
            },
        }
    }
}

/// What came back
#[derive(Debug, Clone, PartialEq)]
pub enum CachedOutcome {
    Hit(LookupHit),
    NotFound,
    /// Gave up after retries or a non-transient error
    Failed { attempts: u32, reason: String },
}

/// Lookup outcomes for one run
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: BTreeMap<CacheKey, CachedOutcome>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<&CachedOutcome> {
        self.entries.get(key)
    }

    pub fn hit(&self, key: &CacheKey) -> Option<&LookupHit> {
        match self.entries.get(key) {
            Some(CachedOutcome::Hit(hit)) => Some(hit),
            _ => None,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// First outcome for a key is kept; a query maps to one answer per run
    pub fn insert(&mut self, key: CacheKey, outcome: CachedOutcome) {
        self.entries.entry(key).or_insert(outcome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts of (hits, not found, failed)
    pub fn summary(&self) -> (usize, usize, usize) {
        self.entries.values().fold((0, 0, 0), |(h, n, f), o| match o {
            CachedOutcome::Hit(_) => (h + 1, n, f),
            CachedOutcome::NotFound => (h, n + 1, f),
            CachedOutcome::Failed { .. } => (h, n, f + 1),
        })
    }
}
