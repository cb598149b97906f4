//! emc-merge - Exo-MerCat merge engine entry point
//!
//! Reads one normalized CSV table per source catalog, resolves every record
//! to a canonical stellar identifier, merges records describing the same
//! planet and writes the merged catalog plus the decision log.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use emc_common::config::MergeConfig;
use emc_common::table::read_catalog_table;
use emc_common::SourceCatalog;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use emc_merge::merge::pipeline::MergePipeline;
use emc_merge::merge::tier1::lookup::{OfflineLookup, StellarLookup};
use emc_merge::merge::tier1::normalizer::normalize_all;
use emc_merge::merge::tier1::replacements::KnownMistakes;
use emc_merge::merge::tier1::simbad_client::SimbadClient;
use emc_merge::merge::types::MergedEntry;
use emc_merge::output::{
    carry_row_updates, write_decision_log_file, write_merged_catalog_file, PreviousCatalog,
};
use emc_merge::MergeError;

/// Command-line arguments for emc-merge
#[derive(Parser, Debug)]
#[command(name = "emc-merge")]
#[command(about = "Merge exoplanet catalogs into one de-duplicated table")]
#[command(version)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "EMC_CONFIG")]
    config: Option<PathBuf>,

    /// Source table as catalog=path, e.g. nasa=nasa.csv (repeatable)
    #[arg(short, long = "input", value_parser = parse_input, required = true)]
    inputs: Vec<(SourceCatalog, PathBuf)>,

    /// Merged catalog output (CSV)
    #[arg(short, long, default_value = "exo-mercat.csv")]
    output: PathBuf,

    /// Decision log output (JSON lines); defaults next to the output
    #[arg(short, long)]
    decision_log: Option<PathBuf>,

    /// Previous merged catalog, for carrying row update dates
    #[arg(short, long)]
    previous: Option<PathBuf>,

    /// Skip the external name-resolution service
    #[arg(long)]
    offline: bool,
}

fn parse_input(value: &str) -> std::result::Result<(SourceCatalog, PathBuf), String> {
    let (catalog, path) = value
        .split_once('=')
        .ok_or_else(|| format!("expected catalog=path, got '{}'", value))?;
    let catalog: SourceCatalog = catalog.parse().map_err(|e| format!("{}", e))?;
    if path.trim().is_empty() {
        return Err(format!("empty path for catalog '{}'", catalog));
    }
    Ok((catalog, PathBuf::from(path)))
}

fn decision_log_path(args: &Args) -> PathBuf {
    args.decision_log
        .clone()
        .unwrap_or_else(|| args.output.with_extension("decisions.jsonl"))
}

/// Write whatever was decided before a fatal error, then hand the error back
fn abort(pipeline: &MergePipeline, log_path: &Path, err: MergeError, context: &str) -> anyhow::Error {
    error!("{}: {}", context, err);
    if let Err(write_err) = write_decision_log_file(log_path, pipeline.decision_log()) {
        error!("Failed to write decision log: {}", write_err);
    }
    anyhow::Error::new(err).context(context.to_string())
}

/// Write the merged catalog, then the decision log
///
/// A failed catalog write still leaves the decision log behind.
fn write_outputs(
    output: &Path,
    log_path: &Path,
    pipeline: &MergePipeline,
    entries: &[MergedEntry<'_>],
) -> Result<()> {
    if let Err(e) = write_merged_catalog_file(output, entries) {
        let context = format!("Failed to write {}", output.display());
        return Err(abort(pipeline, log_path, e, &context));
    }
    write_decision_log_file(log_path, pipeline.decision_log())
        .with_context(|| format!("Failed to write {}", log_path.display()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The configured level is the filter fallback, so configuration loads first
    let config = MergeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting emc-merge v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &args.config {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: resolved from environment or defaults"),
    }

    let mut seen = BTreeSet::new();
    for (catalog, _) in &args.inputs {
        if !seen.insert(*catalog) {
            bail!("Catalog '{}' given more than once", catalog);
        }
    }

    let mut tables = Vec::with_capacity(args.inputs.len());
    for (catalog, path) in &args.inputs {
        let rows = read_catalog_table(path)
            .with_context(|| format!("Failed to read {} table {}", catalog, path.display()))?;
        info!(catalog = %catalog, rows = rows.len(), path = %path.display(), "Source table loaded");
        tables.push((*catalog, rows));
    }

    let previous = match &args.previous {
        Some(path) => Some(
            PreviousCatalog::read_file(path)
                .with_context(|| format!("Failed to read previous catalog {}", path.display()))?,
        ),
        None => None,
    };

    let lookup: Arc<dyn StellarLookup> = if args.offline {
        info!("Offline mode: no external lookups, every record stays unresolved");
        Arc::new(OfflineLookup)
    } else {
        Arc::new(SimbadClient::new(&config.resolver).context("Failed to create SIMBAD client")?)
    };

    let mistakes = KnownMistakes::from_config(&config.replacements);
    let mut pipeline = MergePipeline::new(config, lookup).context("Invalid merge configuration")?;
    let log_path = decision_log_path(&args);

    let records = match normalize_all(&tables, &mistakes, pipeline.decision_log_mut()) {
        Ok(records) => records,
        Err(e) => return Err(abort(&pipeline, &log_path, e, "Failed to normalize source tables")),
    };
    info!(records = records.len(), "Source records normalized");

    let mut entries = match pipeline.run(&records).await {
        Ok(entries) => entries,
        Err(e) => return Err(abort(&pipeline, &log_path, e, "Merge run aborted")),
    };

    if let Some(previous) = &previous {
        carry_row_updates(&mut entries, previous);
    }

    write_outputs(&args.output, &log_path, &pipeline, &entries)?;

    info!(entries = entries.len(), "Merge complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_input() {
        let (catalog, path) = parse_input("nasa=data/nasa.csv").unwrap();
        assert_eq!(catalog, SourceCatalog::Nasa);
        assert_eq!(path, PathBuf::from("data/nasa.csv"));

        assert!(parse_input("nasa").is_err());
        assert!(parse_input("nasa=").is_err());
        assert!(parse_input("exoplanets=x.csv").is_err());
    }

    #[test]
    fn test_decision_log_defaults_next_to_output() {
        let args = Args::parse_from(["emc-merge", "--input", "eu=eu.csv", "--output", "out/merged.csv"]);
        assert_eq!(decision_log_path(&args), PathBuf::from("out/merged.decisions.jsonl"));
    }

    fn offline_pipeline() -> MergePipeline {
        let mut pipeline = MergePipeline::new(MergeConfig::default(), Arc::new(OfflineLookup)).unwrap();
        pipeline
            .decision_log_mut()
            .record(emc_merge::merge::decision_log::Decision::GroupingNotConverged { iterations: 1 });
        pipeline
    }

    #[test]
    fn test_outputs_written_together() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("merged.csv");
        let log_path = dir.path().join("merged.decisions.jsonl");

        write_outputs(&output, &log_path, &offline_pipeline(), &[]).unwrap();
        assert!(output.exists());
        assert!(log_path.exists());
    }

    #[test]
    fn test_failed_catalog_write_keeps_decision_log() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("missing").join("merged.csv");
        let log_path = dir.path().join("merged.decisions.jsonl");

        let err = write_outputs(&output, &log_path, &offline_pipeline(), &[]).unwrap_err();
        assert!(err.to_string().contains("Failed to write"));
        assert!(!output.exists());
        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("grouping_not_converged"));
    }
}
