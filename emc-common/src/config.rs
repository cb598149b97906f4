//! Configuration loading and resolution
//!
//! The merge engine is configured from a static TOML file. The file is
//! located following the priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`EMC_CONFIG`)
//! 3. User config file (`<config dir>/exo-mercat/emc.toml`)
//! 4. Compiled defaults (fallback)
//!
//! A missing file never terminates the run: a warning is logged and the
//! compiled defaults are used. A file that exists but cannot be parsed is
//! a fatal configuration error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::catalog::SourceCatalog;
use crate::{Error, Result};

/// Environment variable naming the configuration file
pub const CONFIG_ENV_VAR: &str = "EMC_CONFIG";

/// One arcsecond in degrees
pub const ARCSECOND_DEG: f64 = 1.0 / 3600.0;

/// Complete merge configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    pub tolerances: ToleranceConfig,
    pub grouping: GroupingConfig,
    pub resolver: ResolverConfig,
    /// Query string -> forced main identifier
    pub overrides: BTreeMap<String, String>,
    pub catalogs: CatalogConfig,
    pub replacements: ReplacementsConfig,
    pub logging: LoggingConfig,
}

/// Matching and closeness thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Maximum angular separation (degrees) for two positions to be the same star
    pub angular_separation_deg: f64,
    /// Relative tolerance for two periods to denote the same planet
    pub period_relative: f64,
    /// Relative tolerance for two semi-major axes to denote the same planet
    pub semi_major_axis_relative: f64,
    /// Relative tolerance for two values to endorse each other in consolidation
    pub value_closeness_relative: f64,
    /// Entries whose selected mass exceeds this (Jupiter masses) are dropped
    pub brown_dwarf_mass_limit_mjup: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            angular_separation_deg: ARCSECOND_DEG,
            period_relative: 0.1,
            semi_major_axis_relative: 0.1,
            value_closeness_relative: 0.01,
            brown_dwarf_mass_limit_mjup: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Upper bound on fixed-point grouping passes
    pub max_iterations: usize,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self { max_iterations: 10 }
    }
}

/// External name-resolution service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// SIMBAD TAP endpoint
    pub simbad_url: String,
    /// VizieR TAP endpoint (TIC lookups)
    pub vizier_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Retries after the first attempt on transient failures
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Lookups in flight at once
    pub max_concurrency: usize,
    /// Star names per batched SIMBAD query
    pub batch_size: usize,
    pub requests_per_second: u32,
    /// Cone radius (degrees) for coordinate fallback searches
    pub coordinate_search_radius_deg: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            simbad_url: "https://simbad.cds.unistra.fr/simbad/sim-tap".to_string(),
            vizier_url: "https://tapvizier.cds.unistra.fr/TAPVizieR/tap".to_string(),
            timeout_secs: 15,
            connect_timeout_secs: 5,
            max_retries: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 4000,
            max_concurrency: 4,
            batch_size: 200,
            requests_per_second: 5,
            coordinate_search_radius_deg: ARCSECOND_DEG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog precedence, most trusted first; final consolidation tie-break
    pub precedence: Vec<SourceCatalog>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            precedence: SourceCatalog::ALL.to_vec(),
        }
    }
}

/// Known catalog mistakes, corrected before names are standardized
///
/// Keys are spelled as the catalogs write them. Name and host rewrites are
/// applied in declaration order, so `host_to_host` sees hosts already
/// rewritten by `name_to_host`. `name_to_binary` keys are standardized
/// planet names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplacementsConfig {
    /// Column -> substrings; a row whose cell contains one is dropped
    pub drop: BTreeMap<String, Vec<String>>,
    /// Planet name -> corrected planet name
    pub name_to_name: BTreeMap<String, String>,
    /// Planet name -> corrected host
    pub name_to_host: BTreeMap<String, String>,
    pub host_to_host: BTreeMap<String, String>,
    /// Planet name -> binary label; empty clears the label
    pub name_to_binary: BTreeMap<String, String>,
    /// Host -> corrected right ascension (degrees)
    pub host_to_ra: BTreeMap<String, f64>,
    /// Host -> corrected declination (degrees)
    pub host_to_dec: BTreeMap<String, f64>,
}

impl ReplacementsConfig {
    pub fn is_empty(&self) -> bool {
        self.drop.is_empty()
            && self.name_to_name.is_empty()
            && self.name_to_host.is_empty()
            && self.host_to_host.is_empty()
            && self.name_to_binary.is_empty()
            && self.host_to_ra.is_empty()
            && self.host_to_dec.is_empty()
    }

    fn validate(&self) -> Result<()> {
        for (column, patterns) in &self.drop {
            if patterns.iter().any(|p| p.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "replacements.drop.{} has an empty pattern, which would drop every row",
                    column
                )));
            }
        }
        for (table, map) in [
            ("name_to_name", &self.name_to_name),
            ("name_to_host", &self.name_to_host),
            ("host_to_host", &self.host_to_host),
        ] {
            if let Some((from, _)) = map.iter().find(|(_, to)| to.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "replacements.{} maps '{}' to an empty string",
                    table, from
                )));
            }
        }
        if let Some((host, ra)) = self
            .host_to_ra
            .iter()
            .find(|(_, ra)| !(0.0..360.0).contains(*ra))
        {
            return Err(Error::Config(format!(
                "replacements.host_to_ra: '{}' has right ascension {} outside [0, 360)",
                host, ra
            )));
        }
        if let Some((host, dec)) = self
            .host_to_dec
            .iter()
            .find(|(_, dec)| !(-90.0..=90.0).contains(*dec))
        {
            return Err(Error::Config(format!(
                "replacements.host_to_dec: '{}' has declination {} outside [-90, 90]",
                host, dec
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl MergeConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MergeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an explicit file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve and load configuration with graceful degradation
    ///
    /// An explicit `cli_arg` must exist; environment and default locations
    /// fall back to compiled defaults when the file is missing.
    pub fn load(cli_arg: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_arg {
            return Self::load_from_file(path);
        }

        match resolve_config_path(None, CONFIG_ENV_VAR) {
            Some(path) if path.exists() => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::load_from_file(&path)
            }
            Some(path) => {
                tracing::warn!(
                    "Config file {} not found, using compiled defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => {
                tracing::info!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Check thresholds for values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        let t = &self.tolerances;
        let positive = [
            ("tolerances.angular_separation_deg", t.angular_separation_deg),
            ("tolerances.period_relative", t.period_relative),
            ("tolerances.semi_major_axis_relative", t.semi_major_axis_relative),
            ("tolerances.value_closeness_relative", t.value_closeness_relative),
            ("tolerances.brown_dwarf_mass_limit_mjup", t.brown_dwarf_mass_limit_mjup),
            (
                "resolver.coordinate_search_radius_deg",
                self.resolver.coordinate_search_radius_deg,
            ),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "{} must be a positive number, got {}",
                    key, value
                )));
            }
        }

        if self.grouping.max_iterations == 0 {
            return Err(Error::Config(
                "grouping.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.resolver.max_concurrency == 0 {
            return Err(Error::Config(
                "resolver.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.resolver.batch_size == 0 {
            return Err(Error::Config(
                "resolver.batch_size must be at least 1".to_string(),
            ));
        }
        if self.resolver.requests_per_second == 0 {
            return Err(Error::Config(
                "resolver.requests_per_second must be at least 1".to_string(),
            ));
        }

        self.replacements.validate()?;

        for (query, target) in &self.overrides {
            if query.trim().is_empty() || target.trim().is_empty() {
                return Err(Error::Config(format!(
                    "override '{}' -> '{}' has an empty side",
                    query, target
                )));
            }
        }

        Ok(())
    }
}

/// Locate the configuration file
///
/// Returns the first candidate by priority; the file may not exist.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: user config directory
    default_config_path()
}

/// Platform config location: `<config dir>/exo-mercat/emc.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("exo-mercat").join("emc.toml"))
}
