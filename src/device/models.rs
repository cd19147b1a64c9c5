use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::serial::PortInfo;

// Minimum MV reply length covering both identity fields
const MIN_REVISION_LEN: usize = 7;

/// Model number and firmware version a drive is expected to report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub model_number: u32,
    pub firmware_version: u32,
}

impl DeviceIdentity {
    pub fn new(model_number: u32, firmware_version: u32) -> Self {
        Self {
            model_number,
            firmware_version,
        }
    }

    /// Firmware version as it appears in the MV reply (two digits, zero padded)
    pub fn firmware_field(&self) -> String {
        format!("{:02}", self.firmware_version)
    }

    /// Model number as it appears in the MV reply (three digits, zero padded)
    pub fn model_field(&self) -> String {
        format!("{:03}", self.model_number)
    }

    pub fn matches(&self, revision: &ModelRevision) -> bool {
        revision.firmware == self.firmware_field() && revision.model == self.model_field()
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "model {} firmware {}", self.model_number, self.firmware_version)
    }
}

/// Parsed MV reply, e.g. `106G020`.
///
/// Offsets 1-2 hold the firmware version and 4-6 the model number. The byte
/// at offset 3 is a revision marker and is not interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRevision {
    pub raw: String,
    pub firmware: String,
    pub marker: String,
    pub model: String,
}

impl ModelRevision {
    /// `None` when the reply is too short to carry both fields
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.len() < MIN_REVISION_LEN {
            return None;
        }
        Some(Self {
            raw: raw.to_string(),
            firmware: raw.get(1..3)?.to_string(),
            marker: raw.get(3..4)?.to_string(),
            model: raw.get(4..7)?.to_string(),
        })
    }

    pub fn firmware_version(&self) -> Option<u32> {
        self.firmware.parse().ok()
    }

    pub fn model_number(&self) -> Option<u32> {
        self.model.parse().ok()
    }
}

impl fmt::Display for ModelRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Device connection state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// A candidate drive port as tracked by the manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveInfo {
    pub id: Uuid,
    pub port_name: String,
    pub hardware_id: String,
    pub connection_state: ConnectionState,
    pub revision: Option<ModelRevision>,
    pub last_seen: DateTime<Utc>,
}

impl DriveInfo {
    pub fn from_port_info(info: &PortInfo) -> Self {
        Self {
            id: Uuid::new_v4(),
            port_name: info.port_name.clone(),
            hardware_id: info.hardware_id.clone(),
            connection_state: ConnectionState::Disconnected,
            revision: None,
            last_seen: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.connection_state, ConnectionState::Connected)
    }

    pub fn update_connection_state(&mut self, state: ConnectionState) {
        self.connection_state = state;
        self.last_seen = Utc::now();
    }

    pub fn update_revision(&mut self, revision: ModelRevision) {
        self.revision = Some(revision);
        self.last_seen = Utc::now();
    }
}
