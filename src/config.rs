//! Dome controller configuration.
//!
//! Parameters are loaded from a TOML file; every field has a default so a
//! partial file (or none at all) still produces a usable configuration.

use serde::Deserialize;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;

/// An error that occurs during loading of a configuration file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot load the configuration file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the configuration file: {0}")]
    DeserialiseError(toml::de::Error),
}

/// Dome controller parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DomeConfig {
    /// Azimuth assigned to the home-sensor position, degrees in [0, 360).
    pub home_azimuth: f64,

    /// Target azimuth for the park command, degrees in [0, 360).
    pub park_azimuth: f64,

    /// Calibrated azimuth degrees per encoder tick. Leave unset to
    /// require a calibration run before azimuth is known.
    pub degrees_per_tick: Option<f64>,

    /// Completion window for goto moves, degrees. Raised to
    /// 1.5 * degrees_per_tick whenever it falls below that.
    pub az_position_tolerance: f64,

    /// Debounce window applied by the hardware layer to the encoder and
    /// home sensor inputs, seconds.
    pub debounce_time: f64,

    /// Upper bound on any single movement phase, seconds. Backstop
    /// against a stuck or failed sensor.
    pub wait_timeout: f64,
}

impl Default for DomeConfig {
    fn default() -> DomeConfig {
        DomeConfig {
            home_azimuth: 0.0,
            park_azimuth: 90.0,
            degrees_per_tick: None,
            az_position_tolerance: 1.0,
            debounce_time: 0.001,
            wait_timeout: 600.0,
        }
    }
}

impl DomeConfig {
    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<DomeConfig, LoadError> {
        let config_str = match read_to_string(path) {
            Ok(s) => s,
            Err(e) => return Err(LoadError::FileLoadError(e)),
        };

        match toml::from_str(config_str.as_str()) {
            Ok(c) => Ok(c),
            Err(e) => Err(LoadError::DeserialiseError(e)),
        }
    }
}
