// Shared Types and Data Contracts
//
// This module defines the explicit data contracts between the three tiers
// of the merge engine. Source records are borrowed read-only for the whole
// run; every tier adds its decisions next to them instead of editing them.

use chrono::NaiveDate;
use emc_common::record::MassKind;
use emc_common::{Coordinates, QuantityKind, SourceCatalog, SourceRecord, Status};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Identifier Resolution (Tier 2 Input/Output)
// ============================================================================

/// How a canonical identifier was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Configured override
    Forced,
    HostSearch,
    AliasSearch,
    TicSearch,
    CoordinateSearch,
}

impl ResolutionMethod {
    /// Label used in the `main_id_provenance` column
    pub fn provenance_label(self) -> &'static str {
        match self {
            Self::Forced => "OVERRIDE",
            Self::HostSearch | Self::AliasSearch => "SIMBAD",
            Self::CoordinateSearch => "SIMBADCOORD",
            Self::TicSearch => "TIC",
        }
    }

    /// Lower is more trusted when several members disagree on coordinates
    fn trust_rank(self) -> u8 {
        match self {
            Self::Forced => 0,
            Self::HostSearch | Self::AliasSearch => 1,
            Self::CoordinateSearch => 2,
            Self::TicSearch => 3,
        }
    }
}

impl fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Forced => "forced",
            Self::HostSearch => "host_search",
            Self::AliasSearch => "alias_search",
            Self::TicSearch => "tic_search",
            Self::CoordinateSearch => "coordinate_search",
        };
        f.write_str(s)
    }
}

/// Result of resolving one query string (or one position)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierResolution {
    pub query: String,
    pub main_id: String,
    /// Coordinates reported by the service, if any
    pub coordinates: Option<Coordinates>,
    pub method: ResolutionMethod,
    /// Separation between the record's and the resolved position (degrees)
    pub angular_separation_deg: Option<f64>,
    /// Other identifiers the service lists for this object
    pub ids: BTreeSet<String>,
}

/// Where a record's `main_id` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MainIdProvenance {
    Resolved(ResolutionMethod),
    /// No service answered; the catalog host string is used as is
    Unresolved(SourceCatalog),
}

impl MainIdProvenance {
    pub fn label(self) -> String {
        match self {
            Self::Resolved(method) => method.provenance_label().to_string(),
            Self::Unresolved(catalog) => catalog.to_string(),
        }
    }

    /// Trust order: resolved by method rank, then unresolved by catalog
    pub fn sort_key(self, precedence: &[SourceCatalog]) -> (u8, usize) {
        match self {
            Self::Resolved(method) => (method.trust_rank(), 0),
            Self::Unresolved(catalog) => (
                10,
                precedence.iter().position(|c| *c == catalog).unwrap_or(usize::MAX),
            ),
        }
    }
}

// ============================================================================
// Flags
// ============================================================================

/// Inconsistency flags carried by records and merged entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flag {
    AngularSeparation,
    BinaryMismatch,
    CoordinateMismatch,
    DuplicateCatalog,
    MergingMismatch,
    /// No lookup resolved the host; kept under its catalog host string
    Unresolved,
}

impl Flag {
    pub const ALL: [Flag; 6] = [
        Flag::AngularSeparation,
        Flag::BinaryMismatch,
        Flag::CoordinateMismatch,
        Flag::DuplicateCatalog,
        Flag::MergingMismatch,
        Flag::Unresolved,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Self::AngularSeparation => "angular_separation_flag",
            Self::BinaryMismatch => "binary_mismatch_flag",
            Self::CoordinateMismatch => "coordinate_mismatch_flag",
            Self::DuplicateCatalog => "duplicate_catalog_flag",
            Self::MergingMismatch => "merging_mismatch_flag",
            Self::Unresolved => "unresolved_flag",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of raised flags
///
/// Flags can be raised or absorbed from another set, never cleared, so no
/// flag can go from true back to false during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Flags {
    bits: u8,
}

impl Flags {
    pub fn raise(&mut self, flag: Flag) {
        self.bits |= flag.bit();
    }

    pub fn absorb(&mut self, other: Flags) {
        self.bits |= other.bits;
    }

    pub fn is_set(&self, flag: Flag) -> bool {
        self.bits & flag.bit() != 0
    }

    pub fn raised(&self) -> impl Iterator<Item = Flag> + '_ {
        Flag::ALL.into_iter().filter(move |f| self.is_set(*f))
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }
}

// ============================================================================
// Tier 2 Working State
// ============================================================================

/// A source record with the resolution decisions made for it
#[derive(Debug, Clone)]
pub struct ResolvedRecord<'a> {
    pub record: &'a SourceRecord,
    pub main_id: String,
    pub provenance: MainIdProvenance,
    /// Coordinates treated as authoritative for this record
    pub coordinates: Option<Coordinates>,
    pub resolution: Option<IdentifierResolution>,
    pub binary: String,
    pub letter: String,
    pub flags: Flags,
}

impl<'a> ResolvedRecord<'a> {
    /// Unresolved starting state: host as identifier, source coordinates
    pub fn unresolved(record: &'a SourceRecord) -> Self {
        Self {
            record,
            main_id: record.host.clone(),
            provenance: MainIdProvenance::Unresolved(record.catalog),
            coordinates: record.coordinates,
            resolution: None,
            binary: record.binary.clone(),
            letter: record.letter.clone(),
            flags: Flags::default(),
        }
    }

    pub fn period(&self) -> Option<(f64, f64)> {
        value_and_error(self.record, QuantityKind::Period)
    }

    pub fn semi_major_axis(&self) -> Option<(f64, f64)> {
        value_and_error(self.record, QuantityKind::SemiMajorAxis)
    }
}

fn value_and_error(record: &SourceRecord, kind: QuantityKind) -> Option<(f64, f64)> {
    let m = record.quantities.get(kind);
    m.value
        .filter(|v| v.is_finite() && *v > 0.0)
        .map(|v| (v, m.max_error().unwrap_or(0.0)))
}

/// A set of records judged to describe one physical planet
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub main_id: String,
    pub binary: String,
    pub letter: String,
    /// Indices into the run's resolved-record list, ascending
    pub members: Vec<usize>,
    /// Flags raised by grouping itself (duplicate key, unverified merge)
    pub flags: Flags,
    /// `catalog: name` of members behind a duplicate flag
    pub duplicate_names: BTreeSet<String>,
}

// ============================================================================
// Tier 2 Output: Consolidated Entries
// ============================================================================

/// Selected value for one quantity of a merged entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedQuantity {
    pub value: f64,
    pub error_min: Option<f64>,
    pub error_max: Option<f64>,
    /// Reference of the selected value
    pub provenance: String,
    /// Catalog the selected value came from
    pub catalog: SourceCatalog,
    /// Every catalog that supplied a value for this quantity
    pub catalog_list: BTreeSet<SourceCatalog>,
    pub theoretical: bool,
}

/// Canonical output record
///
/// Lives for one pipeline run. Member records are borrowed, not copied.
#[derive(Debug, Clone)]
pub struct MergedEntry<'a> {
    pub exo_mercat_name: String,
    pub main_id: String,
    pub main_id_provenance: MainIdProvenance,
    pub main_id_coordinates: Option<Coordinates>,
    pub main_id_aliases: BTreeSet<String>,
    /// Most common catalog host string
    pub host: String,
    pub letter: String,
    pub binary: String,
    pub quantities: BTreeMap<QuantityKind, ConsolidatedQuantity>,
    pub bestmass_provenance: Option<MassKind>,
    pub checked_status: Status,
    /// `catalog: status` pairs of every member, for audit
    pub original_status: String,
    pub status_disagreement: bool,
    pub catalogs: BTreeSet<SourceCatalog>,
    pub catalog_names: BTreeMap<SourceCatalog, String>,
    pub discovery_year: Option<i32>,
    pub discovery_method: BTreeSet<String>,
    /// Largest member separation from its resolved position (degrees)
    pub angular_separation_deg: Option<f64>,
    pub duplicate_names: BTreeSet<String>,
    /// `catalog:quantity:reason` for values removed during normalization
    pub removed_values: BTreeSet<String>,
    pub flags: Flags,
    pub row_update: Option<NaiveDate>,
    pub members: Vec<&'a SourceRecord>,
}

impl<'a> MergedEntry<'a> {
    pub fn quantity(&self, kind: QuantityKind) -> Option<&ConsolidatedQuantity> {
        self.quantities.get(&kind)
    }

    /// Selected best mass value, if any
    pub fn best_mass(&self) -> Option<f64> {
        self.quantity(QuantityKind::BestMass).map(|q| q.value)
    }
}
