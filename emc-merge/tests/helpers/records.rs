//! Source record builders and a one-call merge runner

use emc_common::config::MergeConfig;
use emc_common::{Coordinates, Measurement, SourceCatalog, SourceRecord, Status};
use emc_merge::merge::decision_log::DecisionLog;
use emc_merge::merge::pipeline::MergePipeline;
use emc_merge::merge::tier1::retry::RetryPolicy;
use emc_merge::merge::types::MergedEntry;
use emc_merge::MergeResult;
use std::sync::Arc;
use std::time::Duration;

use super::MockLookup;

/// Confirmed planet `host letter` at (ra, dec)
pub fn planet(catalog: SourceCatalog, host: &str, letter: &str, ra: f64, dec: f64) -> SourceRecord {
    let mut r = SourceRecord::new(catalog, &format!("{} {}", host, letter), host, letter);
    r.coordinates = Some(Coordinates::new(ra, dec));
    r.status = Status::Confirmed;
    r.raw_status = "Confirmed".to_string();
    r
}

pub fn with_period(mut r: SourceRecord, days: f64, error: f64) -> SourceRecord {
    r.quantities.period = Measurement::new(days, Some(error), Some(error), "period-ref");
    r
}

pub fn with_mass(mut r: SourceRecord, mjup: f64, error: f64) -> SourceRecord {
    r.quantities.mass = Measurement::new(mjup, Some(error), Some(error), "mass-ref");
    r
}

/// Retries fast enough for tests
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 1,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        timeout: Duration::from_secs(5),
    }
}

/// Run one merge; the decision log is returned even when the run fails
pub async fn merge<'a>(
    lookup: MockLookup,
    config: MergeConfig,
    records: &'a [SourceRecord],
) -> (MergeResult<Vec<MergedEntry<'a>>>, DecisionLog) {
    merge_shared(Arc::new(lookup), config, records).await
}

/// `merge` with a lookup the test keeps a handle on
pub async fn merge_shared<'a>(
    lookup: Arc<MockLookup>,
    config: MergeConfig,
    records: &'a [SourceRecord],
) -> (MergeResult<Vec<MergedEntry<'a>>>, DecisionLog) {
    let mut pipeline = MergePipeline::new(config, lookup)
        .unwrap()
        .with_retry_policy(fast_retry());
    let result = pipeline.run(records).await;
    (result, pipeline.decision_log().clone())
}
