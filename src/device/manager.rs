use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::DriveConfig;
use crate::serial::transport::{PortEnumerator, SerialPortTransport, SystemPorts};
use crate::serial::{self, AlarmCode, DriveProtocol, Transport};
use super::{list_candidate_ports, ConnectionState, DeviceError, Drive, DriveInfo, Result};

type BoxedTransport = Box<dyn Transport>;
type TransportFactory = dyn Fn() -> BoxedTransport + Send + Sync;

/// Owns at most one bound drive and serializes access to it.
///
/// Drive I/O is blocking and half-duplex, so every command runs under the
/// connection lock. Commands and the handshake run on the blocking pool.
pub struct DriveManager {
    drives: Arc<RwLock<HashMap<Uuid, DriveInfo>>>,
    connected_drive: Arc<Mutex<Option<(Uuid, Drive<BoxedTransport>)>>>,
    enumerator: Arc<dyn PortEnumerator + Send + Sync>,
    transport_factory: Arc<TransportFactory>,
}

impl DriveManager {
    /// Manager over the host's serial ports
    pub fn new() -> Self {
        Self::with_backend(Arc::new(SystemPorts), || {
            Box::new(SerialPortTransport::new()) as BoxedTransport
        })
    }

    /// Manager over any port source and transport, e.g. a simulated bus
    pub fn with_backend<F>(enumerator: Arc<dyn PortEnumerator + Send + Sync>, transport_factory: F) -> Self
    where
        F: Fn() -> BoxedTransport + Send + Sync + 'static,
    {
        Self {
            drives: Arc::new(RwLock::new(HashMap::new())),
            connected_drive: Arc::new(Mutex::new(None)),
            enumerator,
            transport_factory: Arc::new(transport_factory),
        }
    }

    /// Refresh the registry with ports carrying `hardware_id`.
    ///
    /// Known ports keep their id and connection state.
    pub async fn discover(&self, hardware_id: &str) -> Result<Vec<DriveInfo>> {
        let candidates = list_candidate_ports(self.enumerator.as_ref(), hardware_id)?;

        let mut drives_guard = self.drives.write().await;
        let mut discovered = Vec::new();

        for port in candidates {
            let existing_id = drives_guard
                .values()
                .find(|d| d.port_name == port.port_name)
                .map(|d| d.id);

            if let Some(existing) = existing_id.and_then(|id| drives_guard.get_mut(&id)) {
                // Update existing entry but preserve its connection state
                existing.hardware_id = port.hardware_id.clone();
                existing.last_seen = chrono::Utc::now();
                discovered.push(existing.clone());
                continue;
            }

            let info = DriveInfo::from_port_info(&port);
            drives_guard.insert(info.id, info.clone());
            discovered.push(info);
        }

        Ok(discovered)
    }

    /// Get all known drives
    pub async fn get_drives(&self) -> Vec<DriveInfo> {
        let drives_guard = self.drives.read().await;
        drives_guard.values().cloned().collect()
    }

    /// Get a specific drive by ID
    pub async fn get_drive(&self, drive_id: &Uuid) -> Option<DriveInfo> {
        let drives_guard = self.drives.read().await;
        drives_guard.get(drive_id).cloned()
    }

    /// Run discovery and the handshake, then keep the bound drive.
    ///
    /// The connection lock is held for the whole handshake so concurrent
    /// callers cannot bind a second drive. Probed ports are marked
    /// `Connecting` meanwhile and `Error` if no drive answers.
    pub async fn connect(&self, config: DriveConfig) -> Result<DriveInfo> {
        let mut connected_guard = self.connected_drive.lock().await;
        if connected_guard.is_some() {
            return Err(DeviceError::AlreadyConnected);
        }

        config.validate()?;
        let probed: Vec<Uuid> = self
            .discover(&config.hardware_id)
            .await?
            .iter()
            .map(|d| d.id)
            .collect();
        self.update_connection_states(&probed, ConnectionState::Connecting).await;

        let enumerator = self.enumerator.clone();
        let transport = (self.transport_factory)();
        let outcome = tokio::task::spawn_blocking(move || {
            Drive::connect_with(&config, enumerator.as_ref(), transport)
        })
        .await
        .map_err(|e| DeviceError::TaskFailed(e.to_string()));

        let drive = match outcome.and_then(|result| result) {
            Ok(drive) => drive,
            Err(e) => {
                log::error!("Drive connection failed: {}", e);
                self.update_connection_states(&probed, ConnectionState::Error(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let info = {
            let mut drives_guard = self.drives.write().await;
            for id in &probed {
                if let Some(info) = drives_guard.get_mut(id) {
                    info.update_connection_state(ConnectionState::Disconnected);
                }
            }

            let drive_id = drives_guard
                .values()
                .find(|d| d.port_name == drive.port_name())
                .map(|d| d.id)
                .unwrap_or_else(Uuid::new_v4);
            let info = drives_guard.entry(drive_id).or_insert_with(|| DriveInfo {
                id: drive_id,
                ..DriveInfo::from_port_info(drive.port())
            });
            info.update_revision(drive.revision().clone());
            info.update_connection_state(ConnectionState::Connected);
            info.clone()
        };

        log::info!("Successfully connected to drive: {}", info.port_name);
        *connected_guard = Some((info.id, drive));
        Ok(info)
    }

    /// Disconnect from the currently connected drive
    pub async fn disconnect(&self) -> Result<()> {
        let mut connected_guard = self.connected_drive.lock().await;

        if let Some((drive_id, drive)) = connected_guard.take() {
            drive.disconnect();
            self.update_connection_states(&[drive_id], ConnectionState::Disconnected)
                .await;
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }

    /// Id of the bound drive, if any
    pub async fn get_connected_drive_id(&self) -> Option<Uuid> {
        let connected_guard = self.connected_drive.lock().await;
        connected_guard.as_ref().map(|(id, _)| *id)
    }

    /// Run `f` against the bound drive's protocol with exclusive access.
    ///
    /// Serial I/O blocks, so `f` runs on the blocking pool while the
    /// connection lock stays held. A link failure marks the drive `Error`.
    pub async fn execute<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut DriveProtocol<BoxedTransport>) -> serial::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut connected_guard = self.connected_drive.clone().lock_owned().await;
        let drive_id = connected_guard
            .as_ref()
            .map(|(id, _)| *id)
            .ok_or(DeviceError::NotConnected)?;

        let outcome = tokio::task::spawn_blocking(move || match connected_guard.as_mut() {
            Some((_, drive)) => f(drive.protocol_mut()).map_err(DeviceError::SerialError),
            None => Err(DeviceError::NotConnected),
        })
        .await
        .map_err(|e| DeviceError::TaskFailed(e.to_string()))?;

        if let Err(DeviceError::SerialError(e)) = &outcome {
            if e.is_link_failure() {
                self.update_connection_states(&[drive_id], ConnectionState::Error(e.to_string()))
                    .await;
            }
        }
        outcome
    }

    /// Acceleration rate of the bound drive
    pub async fn get_acc_rate(&self) -> Result<u32> {
        self.execute(|protocol| protocol.get_acc_rate()).await
    }

    /// Alarm bits of the bound drive
    pub async fn get_alarm_code(&self) -> Result<AlarmCode> {
        self.execute(|protocol| protocol.get_alarm_code()).await
    }

    /// Clear faults on the bound drive
    pub async fn reset_alarm(&self) -> Result<()> {
        self.execute(|protocol| protocol.reset_alarm()).await
    }

    async fn update_connection_states(&self, drive_ids: &[Uuid], state: ConnectionState) {
        let mut drives_guard = self.drives.write().await;
        for drive_id in drive_ids {
            if let Some(drive) = drives_guard.get_mut(drive_id) {
                drive.update_connection_state(state.clone());
            }
        }
    }
}

impl Default for DriveManager {
    fn default() -> Self {
        Self::new()
    }
}
