// Resolution Decision Log
//
// Concept: Every non-trivial decision the engine takes (identity conflicts,
// forced overrides, raised flags, relabelings, removals) becomes one typed
// entry naming the records involved and the reason.
//
// Output: JSON lines, one object per decision, each carrying the run id and
// a sequence number. Entries are appended in pipeline order, which is
// deterministic for a given input.

use chrono::{DateTime, Utc};
use emc_common::{QuantityKind, SourceCatalog, SourceRecord};
use serde::{Deserialize, Serialize};
use std::io::Write;
use uuid::Uuid;

use crate::merge::types::Flag;

/// Reference to a source record in log entries
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordRef {
    pub catalog: SourceCatalog,
    pub name: String,
}

impl From<&SourceRecord> for RecordRef {
    fn from(record: &SourceRecord) -> Self {
        Self {
            catalog: record.catalog,
            name: record.name.clone(),
        }
    }
}

/// One logged decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Decision {
    /// Linked query strings resolved to different identifiers at one position
    IdentityConflict {
        query_a: String,
        main_id_a: String,
        query_b: String,
        main_id_b: String,
        separation_deg: f64,
        forced: bool,
        records: Vec<RecordRef>,
    },
    /// An override replaced whatever the lookup would have returned
    ForcedOverride {
        query: String,
        main_id: String,
        records: Vec<RecordRef>,
    },
    FlagRaised {
        flag: Flag,
        main_id: String,
        reason: String,
        records: Vec<RecordRef>,
    },
    /// A record's aliases point at a different, distant object than its host
    AliasDisagreement {
        query: String,
        main_id: String,
        alias: String,
        alias_main_id: String,
        records: Vec<RecordRef>,
    },
    /// Lookup gave up after retries; record kept under its host string
    LookupFailed {
        query: String,
        attempts: u32,
        reason: String,
    },
    /// Identifier reached through a shared external id was folded into another
    IdentifierUnified {
        from: String,
        to: String,
        shared_id: String,
    },
    BinaryRelabeled {
        main_id: String,
        letter: String,
        from: String,
        to: String,
        records: Vec<RecordRef>,
    },
    LetterAssigned {
        main_id: String,
        binary: String,
        letter: String,
        synthesized: bool,
        records: Vec<RecordRef>,
    },
    /// Catalog binary label kept although the resolved identifier names another component
    ComponentDisagreement {
        main_id: String,
        catalog_binary: String,
        resolved_binary: String,
        record: RecordRef,
    },
    GroupingNotConverged {
        iterations: usize,
    },
    /// A row matched a configured drop pattern and was not read
    RowDropped {
        catalog: SourceCatalog,
        line: usize,
        column: String,
        pattern: String,
    },
    /// A configured known-mistake correction rewrote one field of a row
    KnownMistakeCorrected {
        catalog: SourceCatalog,
        line: usize,
        field: String,
        from: String,
        to: String,
    },
    ValueRemoved {
        record: RecordRef,
        quantity: QuantityKind,
        reason: String,
    },
    BrownDwarfRemoved {
        exo_mercat_name: String,
        mass_mjup: f64,
    },
    HostNamesDissimilar {
        main_id: String,
        hosts: Vec<String>,
        similarity: f64,
    },
}

impl Decision {
    /// Short kind name for summaries
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IdentityConflict { .. } => "identity_conflict",
            Self::ForcedOverride { .. } => "forced_override",
            Self::FlagRaised { .. } => "flag_raised",
            Self::AliasDisagreement { .. } => "alias_disagreement",
            Self::LookupFailed { .. } => "lookup_failed",
            Self::IdentifierUnified { .. } => "identifier_unified",
            Self::BinaryRelabeled { .. } => "binary_relabeled",
            Self::LetterAssigned { .. } => "letter_assigned",
            Self::ComponentDisagreement { .. } => "component_disagreement",
            Self::GroupingNotConverged { .. } => "grouping_not_converged",
            Self::RowDropped { .. } => "row_dropped",
            Self::KnownMistakeCorrected { .. } => "known_mistake_corrected",
            Self::ValueRemoved { .. } => "value_removed",
            Self::BrownDwarfRemoved { .. } => "brown_dwarf_removed",
            Self::HostNamesDissimilar { .. } => "host_names_dissimilar",
        }
    }
}

#[derive(Serialize)]
struct LogLine<'a> {
    run_id: Uuid,
    seq: usize,
    #[serde(flatten)]
    decision: &'a Decision,
}

/// Append-only log of one run's decisions
#[derive(Debug, Clone)]
pub struct DecisionLog {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    entries: Vec<Decision>,
}

impl Default for DecisionLog {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionLog {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: emc_common::time::now(),
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn record(&mut self, decision: Decision) {
        tracing::debug!(kind = decision.kind(), "Decision recorded");
        self.entries.push(decision);
    }

    /// Convenience for the most common entry
    pub fn flag(&mut self, flag: Flag, main_id: &str, reason: impl Into<String>, records: Vec<RecordRef>) {
        self.record(Decision::FlagRaised {
            flag,
            main_id: main_id.to_string(),
            reason: reason.into(),
            records,
        });
    }

    pub fn entries(&self) -> &[Decision] {
        &self.entries
    }

    pub fn count(&self, kind: &str) -> usize {
        self.entries.iter().filter(|d| d.kind() == kind).count()
    }

    /// Write one JSON object per line
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> Result<(), serde_json::Error> {
        for (seq, decision) in self.entries.iter().enumerate() {
            let line = LogLine {
                run_id: self.run_id,
                seq,
                decision,
            };
            serde_json::to_writer(&mut writer, &line)?;
            writer.write_all(b"\n").map_err(serde_json::Error::io)?;
        }
        Ok(())
    }
}
