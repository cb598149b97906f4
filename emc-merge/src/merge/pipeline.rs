// Merge Pipeline
//
// Concept: One merge run from normalized source records to named, checked
// merged entries
// Synchronization: Identifier resolution completes (all lookups joined)
// before binary normalization starts; every later stage is synchronous
//
// Algorithm:
// 1. Validate configuration (thresholds, overrides, precedence)
// 2. Order records canonically so nothing depends on input order
// 3. Resolve identifiers (Tier 2, async, bounded concurrency)
// 4. Normalize binary labels, group into clusters
// 5. Consolidate each cluster, assign status and flags (Tier 3)
// 6. Name entries, drop brown dwarfs, run consistency checks
// 7. Sort entries by name

use emc_common::config::MergeConfig;
use emc_common::SourceRecord;
use std::sync::Arc;
use std::time::Instant;

use super::decision_log::{Decision, DecisionLog};
use super::tier1::lookup::StellarLookup;
use super::tier1::retry::RetryPolicy;
use super::tier2::attribute_consolidator::{AttributeConsolidator, CatalogPrecedence};
use super::tier2::binary_normalizer::BinaryNormalizer;
use super::tier2::grouping_engine::{assign_exo_mercat_names, GroupingEngine};
use super::tier2::identity_resolver::IdentifierResolver;
use super::tier2::overrides::OverrideTable;
use super::tier3::consistency_checker::ConsistencyChecker;
use super::tier3::status_assignor::StatusAssignor;
use super::types::MergedEntry;
use crate::error::MergeResult;

/// Merge pipeline (orchestration concept)
///
/// **Legible Software Principle:**
/// - Independent module: Owns no merge logic, only stage order
/// - Explicit synchronization: Stages run in a fixed sequence
/// - Transparent behavior: Every stage logs its summary
/// - Integrity: Resolution state lives and dies with one `run`
pub struct MergePipeline {
    config: MergeConfig,
    lookup: Arc<dyn StellarLookup>,
    retry_policy: Option<RetryPolicy>,
    log: DecisionLog,
}

impl MergePipeline {
    /// Create a pipeline; fatal configuration problems surface here
    pub fn new(config: MergeConfig, lookup: Arc<dyn StellarLookup>) -> MergeResult<Self> {
        config.validate()?;
        CatalogPrecedence::from_config(&config.catalogs.precedence)?;
        let overrides = OverrideTable::from_config(&config.overrides)?;

        tracing::info!(
            lookup = lookup.name(),
            overrides = overrides.len(),
            precedence = ?config.catalogs.precedence,
            "Merge pipeline configured"
        );

        Ok(Self {
            config,
            lookup,
            retry_policy: None,
            log: DecisionLog::new(),
        })
    }

    /// Replace the retry policy derived from `[resolver]`
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Decisions recorded so far, including those of an aborted run
    pub fn decision_log(&self) -> &DecisionLog {
        &self.log
    }

    /// Log shared with input normalization, which runs before `run`
    pub fn decision_log_mut(&mut self) -> &mut DecisionLog {
        &mut self.log
    }

    /// Run the merge over every source record
    ///
    /// # Errors
    /// Configuration errors and unforced identity conflicts; nothing is
    /// returned for the run in that case.
    pub async fn run<'a>(&mut self, records: &'a [SourceRecord]) -> MergeResult<Vec<MergedEntry<'a>>> {
        let started = Instant::now();
        tracing::info!(run_id = %self.log.run_id(), records = records.len(), "Starting merge run");

        let mut ordered: Vec<&'a SourceRecord> = records.iter().collect();
        ordered.sort_by(|a, b| a.canonical_cmp(b));

        // Step 3: identifiers (the resolver and its cache end here)
        let mut resolver = IdentifierResolver::new(Arc::clone(&self.lookup), &self.config)?;
        if let Some(policy) = self.retry_policy {
            resolver = resolver.with_retry_policy(policy);
        }
        let outcome = resolver.resolve_all(&ordered, &mut self.log).await?;
        drop(resolver);
        let mut resolved = outcome.records;

        // Step 4
        BinaryNormalizer::from_config(&self.config).normalize(&mut resolved, &mut self.log);
        let grouping = GroupingEngine::from_config(&self.config).group(&mut resolved, &mut self.log);

        // Step 5
        let consolidator = AttributeConsolidator::from_config(&self.config)?;
        let assignor = StatusAssignor::new();
        let mut entries: Vec<MergedEntry<'a>> = grouping
            .clusters
            .iter()
            .map(|cluster| {
                let mut entry = consolidator.consolidate(cluster, &resolved, &outcome.aliases);
                assignor.assign(&mut entry, cluster, &resolved);
                entry
            })
            .collect();

        // Step 6
        assign_exo_mercat_names(&mut entries);
        let limit = self.config.tolerances.brown_dwarf_mass_limit_mjup;
        let before = entries.len();
        let log = &mut self.log;
        entries.retain(|entry| match entry.best_mass() {
            Some(mass) if mass > limit => {
                tracing::info!(name = %entry.exo_mercat_name, mass_mjup = mass, "Brown dwarf removed");
                log.record(Decision::BrownDwarfRemoved {
                    exo_mercat_name: entry.exo_mercat_name.clone(),
                    mass_mjup: mass,
                });
                false
            }
            _ => true,
        });
        let brown_dwarfs = before - entries.len();

        let dissimilar = ConsistencyChecker::default().check(&entries, &mut self.log);

        // Step 7
        entries.sort_by(|a, b| a.exo_mercat_name.cmp(&b.exo_mercat_name));

        tracing::info!(
            run_id = %self.log.run_id(),
            records = records.len(),
            entries = entries.len(),
            clusters = grouping.clusters.len(),
            grouping_iterations = grouping.iterations,
            converged = grouping.converged,
            brown_dwarfs,
            dissimilar_hosts = dissimilar,
            decisions = self.log.entries().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Merge run complete"
        );

        Ok(entries)
    }
}
