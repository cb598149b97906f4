//! Per-source planet record model
//!
//! A `SourceRecord` is one planet detection from one source catalog after
//! normalization. The merge engine only reads these records; every
//! resolution decision it makes is stored alongside, never written back.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use crate::catalog::{SourceCatalog, Status};

/// Equatorial coordinates in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub ra: f64,
    pub dec: f64,
}

impl Coordinates {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }

    /// Great-circle distance to `other` in degrees (Vincenty formula)
    pub fn separation_deg(&self, other: &Coordinates) -> f64 {
        let (ra1, dec1) = (self.ra.to_radians(), self.dec.to_radians());
        let (ra2, dec2) = (other.ra.to_radians(), other.dec.to_radians());
        let delta_ra = ra2 - ra1;

        let num1 = dec2.cos() * delta_ra.sin();
        let num2 = dec1.cos() * dec2.sin() - dec1.sin() * dec2.cos() * delta_ra.cos();
        let denom = dec1.sin() * dec2.sin() + dec1.cos() * dec2.cos() * delta_ra.cos();

        num1.hypot(num2).atan2(denom).to_degrees()
    }

    pub fn within(&self, other: &Coordinates, tolerance_deg: f64) -> bool {
        self.separation_deg(other) <= tolerance_deg
    }

    fn total_cmp(&self, other: &Coordinates) -> Ordering {
        self.ra
            .total_cmp(&other.ra)
            .then_with(|| self.dec.total_cmp(&other.dec))
    }
}

/// Measured quantities carried per planet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantityKind {
    Period,
    SemiMajorAxis,
    Eccentricity,
    Inclination,
    Radius,
    Mass,
    Msini,
    BestMass,
}

impl QuantityKind {
    /// Quantities consolidated independently (best mass is derived from mass/msini)
    pub const MEASURED: [QuantityKind; 7] = [
        QuantityKind::Period,
        QuantityKind::SemiMajorAxis,
        QuantityKind::Eccentricity,
        QuantityKind::Inclination,
        QuantityKind::Radius,
        QuantityKind::Mass,
        QuantityKind::Msini,
    ];

    /// Column prefix used in the tabular formats
    pub fn column(self) -> &'static str {
        match self {
            Self::Period => "p",
            Self::SemiMajorAxis => "a",
            Self::Eccentricity => "e",
            Self::Inclination => "i",
            Self::Radius => "r",
            Self::Mass => "mass",
            Self::Msini => "msini",
            Self::BestMass => "bestmass",
        }
    }
}

impl fmt::Display for QuantityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Why a value was removed from a record during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    NegativeValue,
    OutOfRange,
}

/// Which of mass/msini a catalog designates as its best mass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MassKind {
    Mass,
    Msini,
}

impl MassKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mass => "Mass",
            Self::Msini => "Msini",
        }
    }

    pub fn quantity(self) -> QuantityKind {
        match self {
            Self::Mass => QuantityKind::Mass,
            Self::Msini => QuantityKind::Msini,
        }
    }
}

/// One measured value with its error bounds and reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: Option<f64>,
    pub error_min: Option<f64>,
    pub error_max: Option<f64>,
    /// Reference (paper URL, bibcode or catalog name)
    pub url: String,
    /// Model-derived rather than measured
    pub theoretical: bool,
    /// Set when normalization cleared an impossible value
    pub removal: Option<RemovalReason>,
}

impl Measurement {
    pub fn new(value: f64, error_min: Option<f64>, error_max: Option<f64>, url: &str) -> Self {
        Self {
            value: Some(value),
            error_min,
            error_max,
            url: url.to_string(),
            theoretical: false,
            removal: None,
        }
    }

    pub fn is_present(&self) -> bool {
        self.value.map(f64::is_finite).unwrap_or(false)
    }

    pub fn has_errors(&self) -> bool {
        self.error_min.is_some() && self.error_max.is_some()
    }

    /// Larger of the two error bounds, if any
    pub fn max_error(&self) -> Option<f64> {
        match (self.error_min, self.error_max) {
            (Some(lo), Some(hi)) => Some(lo.max(hi)),
            (Some(e), None) | (None, Some(e)) => Some(e),
            (None, None) => None,
        }
    }

    /// `max(error) / |value|`; a zero value falls back to the absolute error
    pub fn relative_error(&self) -> Option<f64> {
        let value = self.value?;
        let err = self.max_error()?;
        if value == 0.0 {
            Some(err)
        } else {
            Some(err / value.abs())
        }
    }

    /// Total order over every field; NaN-safe
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        cmp_opt_f64(self.value, other.value)
            .then_with(|| cmp_opt_f64(self.error_min, other.error_min))
            .then_with(|| cmp_opt_f64(self.error_max, other.error_max))
            .then_with(|| self.url.cmp(&other.url))
            .then_with(|| self.theoretical.cmp(&other.theoretical))
            .then_with(|| self.removal.cmp(&other.removal))
    }

    /// Clear value and errors, keeping the reference and the reason
    pub fn remove(&mut self, reason: RemovalReason) {
        self.value = None;
        self.error_min = None;
        self.error_max = None;
        self.removal = Some(reason);
    }
}

/// The measured quantities of one record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantities {
    pub period: Measurement,
    pub semi_major_axis: Measurement,
    pub eccentricity: Measurement,
    pub inclination: Measurement,
    pub radius: Measurement,
    pub mass: Measurement,
    pub msini: Measurement,
    pub best_mass: Measurement,
}

impl Quantities {
    pub fn get(&self, kind: QuantityKind) -> &Measurement {
        match kind {
            QuantityKind::Period => &self.period,
            QuantityKind::SemiMajorAxis => &self.semi_major_axis,
            QuantityKind::Eccentricity => &self.eccentricity,
            QuantityKind::Inclination => &self.inclination,
            QuantityKind::Radius => &self.radius,
            QuantityKind::Mass => &self.mass,
            QuantityKind::Msini => &self.msini,
            QuantityKind::BestMass => &self.best_mass,
        }
    }

    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        QuantityKind::MEASURED
            .into_iter()
            .chain([QuantityKind::BestMass])
            .map(|kind| self.get(kind).canonical_cmp(other.get(kind)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    pub fn get_mut(&mut self, kind: QuantityKind) -> &mut Measurement {
        match kind {
            QuantityKind::Period => &mut self.period,
            QuantityKind::SemiMajorAxis => &mut self.semi_major_axis,
            QuantityKind::Eccentricity => &mut self.eccentricity,
            QuantityKind::Inclination => &mut self.inclination,
            QuantityKind::Radius => &mut self.radius,
            QuantityKind::Mass => &mut self.mass,
            QuantityKind::Msini => &mut self.msini,
            QuantityKind::BestMass => &mut self.best_mass,
        }
    }
}

/// One planet detection from one source catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub catalog: SourceCatalog,
    /// Planet name as given by the catalog
    pub name: String,
    pub host: String,
    /// Planet label (`b`, `c`, ...), KOI-style `.01`, or empty
    pub letter: String,
    /// Stellar component label (`A`, `B`, `AB`, `N`, ...) or empty
    pub binary: String,
    pub coordinates: Option<Coordinates>,
    pub aliases: BTreeSet<String>,
    pub quantities: Quantities,
    /// Catalog's designation of mass or msini as the best mass
    pub best_mass: Option<MassKind>,
    pub status: Status,
    /// Status string as the catalog wrote it
    pub raw_status: String,
    pub discovery_method: Option<String>,
    pub discovery_year: Option<i32>,
    pub last_update: Option<NaiveDate>,
}

impl SourceRecord {
    pub fn new(catalog: SourceCatalog, name: &str, host: &str, letter: &str) -> Self {
        Self {
            catalog,
            name: name.to_string(),
            host: host.to_string(),
            letter: letter.to_string(),
            binary: String::new(),
            coordinates: None,
            aliases: BTreeSet::new(),
            quantities: Quantities::default(),
            best_mass: None,
            status: Status::Unconfirmed,
            raw_status: String::new(),
            discovery_method: None,
            discovery_year: None,
            last_update: None,
        }
    }

    /// Content-derived total order, independent of the order records were read in
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.catalog
            .cmp(&other.catalog)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.host.cmp(&other.host))
            .then_with(|| self.letter.cmp(&other.letter))
            .then_with(|| self.binary.cmp(&other.binary))
            .then_with(|| match (&self.coordinates, &other.coordinates) {
                (Some(a), Some(b)) => a.total_cmp(b),
                (a, b) => a.is_some().cmp(&b.is_some()),
            })
            .then_with(|| cmp_opt_f64(self.quantities.period.value, other.quantities.period.value))
            .then_with(|| {
                cmp_opt_f64(
                    self.quantities.semi_major_axis.value,
                    other.quantities.semi_major_axis.value,
                )
            })
            .then_with(|| self.aliases.cmp(&other.aliases))
            .then_with(|| self.raw_status.cmp(&other.raw_status))
            .then_with(|| self.quantities.canonical_cmp(&other.quantities))
            .then_with(|| self.best_mass.cmp(&other.best_mass))
            .then_with(|| self.status.cmp(&other.status))
            .then_with(|| self.discovery_method.cmp(&other.discovery_method))
            .then_with(|| self.discovery_year.cmp(&other.discovery_year))
            .then_with(|| self.last_update.cmp(&other.last_update))
    }
}

fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}
