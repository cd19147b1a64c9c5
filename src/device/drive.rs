use crate::config::DriveConfig;
use crate::serial::transport::{PortEnumerator, SerialPortTransport, SystemPorts};
use crate::serial::{DriveProtocol, Transport};

use super::{list_candidate_ports, CandidatePort, DeviceIdentity, Handshake, ModelRevision, Result};

/// An identified drive bound to one open serial port.
///
/// A `Drive` only exists after a successful handshake. Dropping it closes
/// the port.
pub struct Drive<T: Transport = SerialPortTransport> {
    protocol: DriveProtocol<T>,
    port: CandidatePort,
    identity: DeviceIdentity,
    revision: ModelRevision,
}

impl Drive<SerialPortTransport> {
    /// Scan the host's serial ports and bind to the first matching drive
    pub fn connect(config: &DriveConfig) -> Result<Self> {
        Self::connect_with(config, &SystemPorts, SerialPortTransport::new())
    }
}

impl<T: Transport> Drive<T> {
    /// Discover candidates through `enumerator` and probe them over `transport`
    pub fn connect_with<E>(config: &DriveConfig, enumerator: &E, transport: T) -> Result<Self>
    where
        E: PortEnumerator + ?Sized,
    {
        config.validate()?;

        let candidates = list_candidate_ports(enumerator, &config.hardware_id)?;
        let identity = config.identity();
        let binding = Handshake::new(identity, candidates, transport, config.link()).run()?;

        Ok(Self {
            protocol: binding.protocol,
            port: binding.port,
            identity,
            revision: binding.revision,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port.port_name
    }

    pub fn port(&self) -> &CandidatePort {
        &self.port
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// Model/firmware string the drive reported during the handshake
    pub fn revision(&self) -> &ModelRevision {
        &self.revision
    }

    pub fn is_connected(&self) -> bool {
        self.protocol.interface().is_connected()
    }

    pub fn protocol(&self) -> &DriveProtocol<T> {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut DriveProtocol<T> {
        &mut self.protocol
    }

    /// Close the port and release the drive
    pub fn disconnect(mut self) {
        log::info!("Disconnecting from drive on {}", self.port.port_name);
        self.protocol.interface_mut().disconnect();
    }
}
