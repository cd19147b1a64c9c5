pub mod drive;

pub use drive::{ConfigError, DriveConfig, DEFAULT_HARDWARE_ID};
