pub mod codec;
pub mod interface;
pub mod protocol;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod transport;

pub use codec::{Command, Param, Reply};
pub use interface::SerialInterface;
pub use protocol::{AlarmCode, DriveProtocol};
pub use transport::{LinkConfig, PortEnumerator, SerialPortTransport, SystemPorts, TimeoutProfile, Transport};

use serde::{Deserialize, Serialize};

/// A serial port as reported by enumeration, tagged with its hardware id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port_name: String,
    pub hardware_id: String,
}

impl PortInfo {
    pub fn new(port_name: impl Into<String>, hardware_id: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            hardware_id: hardware_id.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Communication timeout")]
    Timeout,

    #[error("Reply exceeded {0} bytes without a terminator")]
    LineTooLong(usize),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Command exceeds {max} bytes ({len})")]
    CommandTooLong { len: usize, max: usize },

    #[error("Invalid {kind} value in {opcode} reply: {value:?}")]
    InvalidValue {
        opcode: String,
        kind: &'static str,
        value: String,
    },

    #[error("Drive rejected {opcode}: {reply}")]
    Rejected { opcode: String, reply: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    SerialportError(#[from] serialport::Error),
}

impl SerialError {
    /// True when the port itself failed, as opposed to a bad command or reply
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            SerialError::Timeout | SerialError::IoError(_) | SerialError::SerialportError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SerialError>;
