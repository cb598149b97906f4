//! Source catalogs and planet status vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Independently maintained exoplanet catalog a record comes from
///
/// Declaration order is the compiled-default precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCatalog {
    /// NASA Exoplanet Archive (Planetary Systems Composite)
    Nasa,
    /// Exoplanet.eu Encyclopaedia
    Eu,
    /// Open Exoplanet Catalogue
    Oec,
    /// K2 targets (EPIC)
    Epic,
    /// Kepler Objects of Interest
    Koi,
}

impl SourceCatalog {
    pub const ALL: [SourceCatalog; 5] = [
        SourceCatalog::Nasa,
        SourceCatalog::Eu,
        SourceCatalog::Oec,
        SourceCatalog::Epic,
        SourceCatalog::Koi,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nasa => "nasa",
            Self::Eu => "eu",
            Self::Oec => "oec",
            Self::Epic => "epic",
            Self::Koi => "koi",
        }
    }
}

impl fmt::Display for SourceCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceCatalog {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nasa" => Ok(Self::Nasa),
            "eu" => Ok(Self::Eu),
            "oec" => Ok(Self::Oec),
            "epic" | "k2" => Ok(Self::Epic),
            "koi" | "kepler" => Ok(Self::Koi),
            other => Err(Error::InvalidInput(format!("unknown catalog '{}'", other))),
        }
    }
}

/// Confirmation status of a planet
///
/// Variants are declared from strongest to weakest claim, so the derived
/// `Ord` gives the merge precedence directly: `Confirmed < Candidate < ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Confirmed,
    Candidate,
    FalsePositive,
    Retracted,
    Unconfirmed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "CONFIRMED",
            Self::Candidate => "CANDIDATE",
            Self::FalsePositive => "FALSE POSITIVE",
            Self::Retracted => "RETRACTED",
            Self::Unconfirmed => "UNCONFIRMED",
        }
    }

    /// Strongest status of a set (confirmed wins over everything)
    pub fn strongest<I: IntoIterator<Item = Status>>(statuses: I) -> Option<Status> {
        statuses.into_iter().min()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    /// Parse an already-normalized status string
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "CONFIRMED" => Ok(Self::Confirmed),
            "CANDIDATE" => Ok(Self::Candidate),
            "FALSE POSITIVE" => Ok(Self::FalsePositive),
            "RETRACTED" => Ok(Self::Retracted),
            "UNCONFIRMED" => Ok(Self::Unconfirmed),
            other => Err(Error::InvalidInput(format!("unknown status '{}'", other))),
        }
    }
}
