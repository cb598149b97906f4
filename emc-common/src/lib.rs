//! # Exo-MerCat Common Library
//!
//! Shared code for the Exo-MerCat tools including:
//! - Source catalog and status enums
//! - Per-source planet record model (`SourceRecord`, `Measurement`)
//! - TOML configuration with priority resolution
//! - CSV table reading with required-column validation
//! - Date helpers

pub mod catalog;
pub mod config;
pub mod error;
pub mod record;
pub mod table;
pub mod time;

pub use catalog::{SourceCatalog, Status};
pub use error::{Error, Result};
pub use record::{Coordinates, Measurement, QuantityKind, Quantities, SourceRecord};
