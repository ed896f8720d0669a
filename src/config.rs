//! Machine configuration.
//!
//! Everything has a default, so an empty JSON object is a valid config and
//! any subset of fields may be given.

use crate::cpu::{Word, MEMORY_SIZE};
use crate::hw::clock::DEFAULT_RATE_HZ;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Addressable words.
    pub memory_words: usize,
    /// MMIO base of the clock's registers.
    pub clock_base: Word,
    /// MMIO base of the keyboard's registers.
    pub keyboard_base: Word,
    /// MMIO base of the display's registers.
    pub display_base: Word,
    /// Clock rate at power-on, in Hz.
    pub clock_rate_hz: Word,
    /// Instructions executed per `run` call by the debugger and the wasm
    /// frame loop.
    pub cycles_per_frame: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_words: MEMORY_SIZE,
            clock_base: 0xF000,
            keyboard_base: 0xF010,
            display_base: 0xF020,
            clock_rate_hz: DEFAULT_RATE_HZ,
            cycles_per_frame: 1000,
        }
    }
}

impl MachineConfig {
    /// Parse a config from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_json(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check the values serde cannot constrain.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_words == 0 || self.memory_words > MEMORY_SIZE {
            return Err(ConfigError::Invalid(format!(
                "memory_words must be in 1..={MEMORY_SIZE}, got {}",
                self.memory_words
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(String),

    #[error("bad config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}
