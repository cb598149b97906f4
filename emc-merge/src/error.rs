//! Error types for emc-merge
//!
//! Only configuration-level problems and unforced identity conflicts abort
//! a run. Everything else degrades to a flag on the affected entry and a
//! decision-log entry.

use thiserror::Error;

/// Fatal merge-run error
#[derive(Debug, Error)]
pub enum MergeError {
    /// Two strings denoting the same star resolved to different identifiers
    /// and no override settles it
    #[error(
        "Identity conflict: '{query_a}' -> '{main_id_a}' but '{query_b}' -> '{main_id_b}' \
         (separation {separation_deg:.6} deg); add an [overrides] entry to force one"
    )]
    IdentityConflict {
        query_a: String,
        main_id_a: String,
        query_b: String,
        main_id_b: String,
        separation_deg: f64,
    },

    /// Override keys standardize to the same query but force different ids
    #[error("Contradictory override: '{query}' forced to both '{first}' and '{second}'")]
    ContradictoryOverride {
        query: String,
        first: String,
        second: String,
    },

    /// Catalog precedence does not order every catalog exactly once
    #[error("Catalog precedence tie: {0}")]
    PrecedenceTie(String),

    /// A record designates both mass and msini as its best mass
    #[error("Both mass and msini flagged as best mass for {catalog} record '{name}'")]
    BestMassConflict { catalog: String, name: String },

    /// Required column missing from an input table
    #[error("Required column '{column}' missing from {table}")]
    MissingColumn { table: String, column: String },

    /// Unusable cell value in an input table
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Output serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// emc-common error
    #[error("Common error: {0}")]
    Common(emc_common::Error),
}

impl From<emc_common::Error> for MergeError {
    fn from(err: emc_common::Error) -> Self {
        match err {
            emc_common::Error::MissingColumn { table, column } => {
                MergeError::MissingColumn { table, column }
            }
            emc_common::Error::InvalidInput(msg) => MergeError::InvalidInput(msg),
            other => MergeError::Common(other),
        }
    }
}

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;
