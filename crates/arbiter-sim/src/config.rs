//! Simulation configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```toml
//! seed = 42
//! requests = 500
//! max_offset = 256
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::SimError;

/// Shape of a randomized run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// RNG seed; the same seed replays the same run.
    pub seed: u64,
    /// Operations to submit.
    pub requests: usize,
    /// Distinct files the workload touches.
    pub files: u64,
    /// Offsets are drawn from `[0, max_offset)`.
    pub max_offset: i64,
    /// Lengths are drawn from `[1, max_len]`.
    pub max_len: usize,
    /// Fraction of operations that are reads.
    pub read_ratio: f64,
    /// Chance of completing one in-flight request after each submission.
    pub completion_probability: f64,
    /// Completions are forced while this many requests are in flight.
    pub max_in_flight: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            requests: 200,
            files: 2,
            max_offset: 128,
            max_len: 32,
            read_ratio: 0.5,
            completion_probability: 0.5,
            max_in_flight: 16,
        }
    }
}

impl SimConfig {
    /// Returns this config with `seed` replaced.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Returns this config with the request count replaced.
    pub fn with_requests(mut self, requests: usize) -> Self {
        self.requests = requests;
        self
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, SimError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: &Path) -> Result<Self, SimError> {
        let contents = std::fs::read_to_string(path).map_err(|source| SimError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Checks every field is in range.
    pub fn validate(&self) -> Result<(), SimError> {
        if self.files == 0 {
            return Err(SimError::Config("files must be at least 1".to_string()));
        }
        if self.max_offset <= 0 {
            return Err(SimError::Config("max_offset must be positive".to_string()));
        }
        if self.max_len == 0 {
            return Err(SimError::Config("max_len must be at least 1".to_string()));
        }
        if self.max_in_flight == 0 {
            return Err(SimError::Config(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("read_ratio", self.read_ratio),
            ("completion_probability", self.completion_probability),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }
}
