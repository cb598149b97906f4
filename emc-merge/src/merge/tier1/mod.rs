// Tier 1: Normalization and Lookup Plumbing
//
// Each module in this tier is an independent "concept": known-mistake
// corrections, catalog strategies and name rules produce `SourceRecord`s, the lookup trait and its HTTP
// client answer single resolution queries, and the retry helper bounds how
// long any one query may take.

pub mod catalogs;
pub mod lookup;
pub mod names;
pub mod normalizer;
pub mod replacements;
pub mod retry;
pub mod simbad_client;
