pub mod discovery;
pub mod drive;
pub mod handshake;
pub mod manager;
pub mod models;

pub use discovery::{list_candidate_ports, CandidatePort};
pub use drive::Drive;
pub use handshake::{Binding, Handshake, HandshakeState, ProbeOutcome, ProbeResult};
pub use manager::DriveManager;
pub use models::*;


#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("No drive answered with the expected identity ({candidates} candidate ports probed)")]
    NotFound { candidates: usize },

    #[error("Device already connected")]
    AlreadyConnected,

    #[error("Device not connected")]
    NotConnected,

    #[error("Invalid device configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Serial communication error: {0}")]
    SerialError(#[from] crate::serial::SerialError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl From<crate::config::ConfigError> for DeviceError {
    fn from(err: crate::config::ConfigError) -> Self {
        DeviceError::InvalidConfiguration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;
