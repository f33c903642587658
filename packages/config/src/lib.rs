#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Layered TOML configuration for the crime-route pipeline.
//!
//! Defaults are embedded at compile time from `config/default.toml`. A
//! user file (passed explicitly or named by the `CRIME_ROUTE_CONFIG`
//! environment variable) is merged over them key by key, so it only needs
//! the values it changes. The merged result is validated before use.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable naming a user configuration file.
pub const CONFIG_ENV_VAR: &str = "CRIME_ROUTE_CONFIG";

const DEFAULT_TOML: &str = include_str!("../config/default.toml");

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading the config file failed.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML could not be parsed or did not match the schema.
    #[error("Invalid config TOML: {0}")]
    Toml(String),

    /// A value is outside its allowed range.
    #[error("Invalid config value for {field}: {message}")]
    Invalid {
        /// Dotted key of the offending value.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Config {
    /// Block sampling.
    pub sampling: SamplingConfig,
    /// Batch geocoding service.
    pub geocoder: GeocoderConfig,
    /// Risk surface fitting.
    pub risk: RiskConfig,
    /// Graph annotation.
    pub graph: GraphConfig,
    /// Route evaluation.
    pub routing: RoutingConfig,
}

/// `[sampling]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SamplingConfig {
    /// Address-number step between block samples.
    pub spacing: u32,
    /// Two-letter state used when formatting sample addresses.
    pub state: String,
}

/// `[geocoder]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GeocoderConfig {
    /// Service base URL, without the `/locations/...` suffix.
    pub base_url: String,
    /// Census benchmark name.
    pub benchmark: String,
    /// Maximum rows per batch request.
    pub max_batch_size: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Keep `Tie` matches in addition to exact `Match` results.
    pub accept_ties: bool,
}

/// `[risk]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiskConfig {
    /// Bandwidth override. Scott's rule when absent.
    #[serde(default)]
    pub bandwidth: Option<BandwidthConfig>,
    /// Upper bound of the per-point replication count.
    pub max_replications: u32,
}

/// `[risk.bandwidth]` table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum BandwidthConfig {
    /// Scott's rule of thumb.
    Scott,
    /// Scale the data covariance by `value` squared.
    Factor {
        /// Covariance scale factor.
        value: f64,
    },
    /// Isotropic kernel with standard deviation `value` map units.
    Fixed {
        /// Kernel standard deviation.
        value: f64,
    },
}

/// `[graph]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GraphConfig {
    /// Distance between samples along an edge, in map units.
    pub step: f64,
    /// Risk amplification factor.
    pub alpha: f64,
    /// Directory holding the annotated graph cache.
    pub cache_dir: PathBuf,
}

/// `[routing]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoutingConfig {
    /// Walking pace used to derive route times.
    pub walking_speed_kmh: f64,
}

impl Default for Config {
    fn default() -> Self {
        // The embedded defaults are checked by `defaults_are_valid`.
        toml::from_str(DEFAULT_TOML)
            .unwrap_or_else(|e| panic!("Embedded default config is invalid: {e}"))
    }
}

impl Config {
    /// Loads the defaults, overlays `path` (or the file named by
    /// [`CONFIG_ENV_VAR`] when `path` is `None`), and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the override file cannot be read or
    /// parsed, or if a merged value is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(env_path);

        let Some(path) = path else {
            return Self::from_toml_overrides("");
        };

        log::info!("Loading config overrides from {}", path.display());
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::from_toml_overrides(&contents)
    }

    /// Merges `overrides` over the embedded defaults and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `overrides` is not valid TOML or a
    /// merged value is out of range.
    pub fn from_toml_overrides(overrides: &str) -> Result<Self, ConfigError> {
        let mut base: toml::Table = DEFAULT_TOML
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Toml(e.to_string()))?;
        let overrides: toml::Table = overrides
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Toml(e.to_string()))?;

        merge_tables(&mut base, overrides);

        let merged = toml::to_string(&base).map_err(|e| ConfigError::Toml(e.to_string()))?;
        let config: Self =
            toml::from_str(&merged).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every knob against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.spacing == 0 {
            return Err(invalid("sampling.spacing", "must be at least 1"));
        }
        if !(1..=10_000).contains(&self.geocoder.max_batch_size) {
            return Err(invalid(
                "geocoder.max_batch_size",
                "must be between 1 and 10000",
            ));
        }
        if self.geocoder.timeout_secs == 0 {
            return Err(invalid("geocoder.timeout_secs", "must be positive"));
        }
        if self.risk.max_replications == 0 {
            return Err(invalid("risk.max_replications", "must be at least 1"));
        }
        match self.risk.bandwidth {
            Some(BandwidthConfig::Factor { value } | BandwidthConfig::Fixed { value })
                if !(value.is_finite() && value > 0.0) =>
            {
                return Err(invalid("risk.bandwidth.value", "must be positive"));
            }
            _ => {}
        }
        if !(self.graph.step.is_finite() && self.graph.step > 0.0) {
            return Err(invalid("graph.step", "must be positive"));
        }
        if !(self.graph.alpha.is_finite() && self.graph.alpha >= 0.0) {
            return Err(invalid("graph.alpha", "must be non-negative"));
        }
        if !(self.routing.walking_speed_kmh.is_finite() && self.routing.walking_speed_kmh > 0.0) {
            return Err(invalid("routing.walking_speed_kmh", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.to_string(),
    }
}

/// Recursively overlays `overrides` onto `base`. Tables merge key by key;
/// any other value replaces the base value.
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(override_table)) => {
                merge_tables(base_table, override_table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::from_toml_overrides("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.sampling.spacing, 20);
        assert_eq!(config.geocoder.max_batch_size, 9999);
        assert!((config.graph.step - 25.0).abs() < f64::EPSILON);
        assert!((config.graph.alpha - 3.0).abs() < f64::EPSILON);
        assert!(config.risk.bandwidth.is_none());
        assert!(!config.geocoder.accept_ties);
    }

    #[test]
    fn overrides_merge_per_key() {
        let config = Config::from_toml_overrides(
            "[graph]\nalpha = 5.0\n\n[risk.bandwidth]\nrule = \"fixed\"\nvalue = 150.0\n",
        )
        .unwrap();
        assert!((config.graph.alpha - 5.0).abs() < f64::EPSILON);
        // Untouched keys in the same section keep their defaults
        assert!((config.graph.step - 25.0).abs() < f64::EPSILON);
        assert_eq!(
            config.risk.bandwidth,
            Some(BandwidthConfig::Fixed { value: 150.0 })
        );
    }

    #[test]
    fn rejects_zero_spacing() {
        let err = Config::from_toml_overrides("[sampling]\nspacing = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "sampling.spacing",
                ..
            }
        ));
    }

    #[test]
    fn rejects_oversized_batches() {
        let err = Config::from_toml_overrides("[geocoder]\nmax_batch_size = 20000\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "geocoder.max_batch_size",
                ..
            }
        ));
    }

    #[test]
    fn rejects_negative_alpha() {
        assert!(Config::from_toml_overrides("[graph]\nalpha = -1.0\n").is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            Config::from_toml_overrides("[graph\nalpha = "),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn loads_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crime_route.toml");
        std::fs::write(&path, "[sampling]\nspacing = 10\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.sampling.spacing, 10);
    }

    #[test]
    fn missing_override_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/crime_route.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
