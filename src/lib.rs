pub mod serial;
pub mod device;
pub mod config;

pub use config::DriveConfig;
pub use device::{DeviceError, DeviceIdentity, Drive, DriveManager, ModelRevision};
pub use serial::{AlarmCode, DriveProtocol, SerialError};
