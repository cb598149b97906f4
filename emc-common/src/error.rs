//! Common error types for Exo-MerCat

use thiserror::Error;

/// Common result type for Exo-MerCat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the Exo-MerCat crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML configuration could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// CSV table could not be read or written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A column every input table must carry is absent
    #[error("Required column '{column}' missing from {table}")]
    MissingColumn { table: String, column: String },

    /// Invalid user input or cell value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
