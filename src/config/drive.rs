use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::device::DeviceIdentity;
use crate::serial::transport::{LinkConfig, TimeoutProfile, DEFAULT_BAUD_RATE, RS232_HARDWARE_ID};

/// Hardware id the drive family's RS-232 ports enumerate with
pub const DEFAULT_HARDWARE_ID: &str = RS232_HARDWARE_ID;

// Widths of the firmware and model fields in the MV reply
const MAX_FIRMWARE_VERSION: u32 = 99;
const MAX_MODEL_NUMBER: u32 = 999;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Expected drive identity and link settings for one controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveConfig {
    pub model_number: u32,
    pub firmware_version: u32,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_hardware_id")]
    pub hardware_id: String,
    #[serde(default)]
    pub timeouts: TimeoutProfile,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_hardware_id() -> String {
    DEFAULT_HARDWARE_ID.to_string()
}

impl DriveConfig {
    pub fn new(model_number: u32, firmware_version: u32) -> Self {
        Self {
            model_number,
            firmware_version,
            baud_rate: DEFAULT_BAUD_RATE,
            hardware_id: default_hardware_id(),
            timeouts: TimeoutProfile::default(),
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_hardware_id(mut self, hardware_id: impl Into<String>) -> Self {
        self.hardware_id = hardware_id.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutProfile) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.model_number, self.firmware_version)
    }

    pub fn link(&self) -> LinkConfig {
        LinkConfig::new(self.baud_rate, self.timeouts)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.firmware_version > MAX_FIRMWARE_VERSION {
            return Err(ConfigError::Invalid(format!(
                "firmware version {} does not fit two digits",
                self.firmware_version
            )));
        }
        if self.model_number > MAX_MODEL_NUMBER {
            return Err(ConfigError::Invalid(format!(
                "model number {} does not fit three digits",
                self.model_number
            )));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud rate must be non-zero".to_string()));
        }
        if self.timeouts.inter_byte_ms == 0 || self.timeouts.overall_ms == 0 {
            return Err(ConfigError::Invalid("read timeouts must be non-zero".to_string()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}
