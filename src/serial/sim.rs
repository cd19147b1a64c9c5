//! In-memory drives and ports for exercising discovery, the handshake and
//! the command set without hardware.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::codec::TERMINATOR;
use super::transport::{LinkConfig, PortEnumerator, Transport};
use super::{PortInfo, Result, SerialError};

const ACK: &str = "%";
const NAK: &str = "?";

/// Register-level model of one drive
#[derive(Debug, Clone)]
pub struct SimulatedDrive {
    revision: String,
    registers: HashMap<String, String>,
    powered: bool,
    jogging: bool,
}

impl SimulatedDrive {
    /// A drive answering `MV` with `revision`, e.g. `106G020`
    pub fn new(revision: impl Into<String>) -> Self {
        let registers = [("AC", "25"), ("AL", "0000"), ("JA", "10.000"), ("JS", "1.000")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            revision: revision.into(),
            registers,
            powered: false,
            jogging: false,
        }
    }

    pub fn with_register(mut self, opcode: &str, value: &str) -> Self {
        self.registers.insert(opcode.to_string(), value.to_string());
        self
    }

    pub fn is_jogging(&self) -> bool {
        self.jogging
    }

    /// React to one command line, returning the reply if the drive sends one
    fn handle(&mut self, line: &str) -> Option<String> {
        if line.starts_with("255") {
            self.powered = true;
            return None;
        }
        if !self.powered {
            return None;
        }

        let split = line.len().min(2);
        if !line.is_char_boundary(split) {
            return Some(NAK.to_string());
        }
        let (opcode, param) = line.split_at(split);
        let reply = match (opcode, param) {
            ("MV", "") => format!("MV={}", self.revision),
            ("AR", "") => {
                self.registers.insert("AL".to_string(), "0000".to_string());
                ACK.to_string()
            }
            ("CJ", "") => {
                self.jogging = true;
                ACK.to_string()
            }
            ("SJ", "") => {
                self.jogging = false;
                ACK.to_string()
            }
            ("CS", speed) if self.jogging && speed.parse::<f64>().is_ok() => ACK.to_string(),
            (op, "") => match self.registers.get(op) {
                Some(value) => format!("{}={}", op, value),
                None => NAK.to_string(),
            },
            (op, value) if self.registers.contains_key(op) => {
                self.registers.insert(op.to_string(), value.to_string());
                ACK.to_string()
            }
            _ => NAK.to_string(),
        };
        Some(reply)
    }
}

struct SimPort {
    info: PortInfo,
    drive: Option<SimulatedDrive>,
    available: bool,
}

#[derive(Default)]
struct BusState {
    ports: Vec<SimPort>,
    open_ports: HashSet<String>,
    open_attempts: Vec<String>,
    written: Vec<(String, String)>,
}

/// A set of simulated serial ports, shared by every transport created from it
#[derive(Clone, Default)]
pub struct SimulatedBus {
    inner: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port with a drive attached (or nothing, for a silent port)
    pub fn add_port(&self, info: PortInfo, drive: Option<SimulatedDrive>) -> &Self {
        self.state().ports.push(SimPort {
            info,
            drive,
            available: true,
        });
        self
    }

    /// Add a port that refuses to open, as if held by another process
    pub fn add_busy_port(&self, info: PortInfo) -> &Self {
        self.state().ports.push(SimPort {
            info,
            drive: None,
            available: false,
        });
        self
    }

    pub fn transport(&self) -> SimulatedTransport {
        SimulatedTransport {
            bus: self.clone(),
            port_name: None,
            open: false,
            pending: Vec::new(),
        }
    }

    /// Number of ports currently held open
    pub fn open_sessions(&self) -> usize {
        self.state().open_ports.len()
    }

    pub fn is_open(&self, port_name: &str) -> bool {
        self.state().open_ports.contains(port_name)
    }

    /// Every port an open was attempted on, in order
    pub fn open_attempts(&self) -> Vec<String> {
        self.state().open_attempts.clone()
    }

    /// Command lines written to `port_name`, terminators stripped
    pub fn written(&self, port_name: &str) -> Vec<String> {
        self.state()
            .written
            .iter()
            .filter(|(port, _)| port == port_name)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn register(&self, port_name: &str, opcode: &str) -> Option<String> {
        self.with_drive(port_name, |drive| drive.registers.get(opcode).cloned())
            .flatten()
    }

    pub fn set_register(&self, port_name: &str, opcode: &str, value: &str) {
        self.with_drive(port_name, |drive| {
            drive.registers.insert(opcode.to_string(), value.to_string());
        });
    }

    pub fn is_jogging(&self, port_name: &str) -> bool {
        self.with_drive(port_name, |drive| drive.is_jogging())
            .unwrap_or(false)
    }

    fn with_drive<R>(&self, port_name: &str, f: impl FnOnce(&mut SimulatedDrive) -> R) -> Option<R> {
        let mut state = self.state();
        let drive = state
            .ports
            .iter_mut()
            .find(|p| p.info.port_name == port_name)
            .and_then(|p| p.drive.as_mut());
        drive.map(f)
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PortEnumerator for SimulatedBus {
    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self.state().ports.iter().map(|p| p.info.clone()).collect())
    }
}

/// One session on a `SimulatedBus` port
pub struct SimulatedTransport {
    bus: SimulatedBus,
    port_name: Option<String>,
    open: bool,
    pending: Vec<u8>,
}

impl Transport for SimulatedTransport {
    fn configure(&mut self, port_name: &str, _link: &LinkConfig) {
        self.port_name = Some(port_name.to_string());
    }

    fn open(&mut self) -> Result<()> {
        let name = self
            .port_name
            .clone()
            .ok_or_else(|| SerialError::PortNotFound("No port configured".to_string()))?;
        if self.open {
            return Err(SerialError::ConnectionFailed("Port already open".to_string()));
        }

        let mut state = self.bus.state();
        state.open_attempts.push(name.clone());
        let available = state
            .ports
            .iter()
            .find(|p| p.info.port_name == name)
            .map(|p| p.available)
            .ok_or_else(|| SerialError::PortNotFound(name.clone()))?;
        if !available || state.open_ports.contains(&name) {
            return Err(SerialError::ConnectionFailed(format!("{}: device busy", name)));
        }

        state.open_ports.insert(name);
        self.open = true;
        self.pending.clear();
        Ok(())
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        if let Some(name) = &self.port_name {
            self.bus.state().open_ports.remove(name);
        }
        self.open = false;
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn clear_input(&mut self) -> Result<()> {
        if !self.open {
            return Err(SerialError::NotConnected);
        }
        self.pending.clear();
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<usize> {
        let name = match (&self.port_name, self.open) {
            (Some(name), true) => name.clone(),
            _ => return Err(SerialError::NotConnected),
        };
        let text = String::from_utf8_lossy(data).into_owned();

        let mut state = self.bus.state();
        let mut replies = Vec::new();
        for line in text.split(TERMINATOR as char).filter(|l| !l.is_empty()) {
            state.written.push((name.clone(), line.to_string()));
            let drive = state
                .ports
                .iter_mut()
                .find(|p| p.info.port_name == name)
                .and_then(|p| p.drive.as_mut());
            if let Some(reply) = drive.and_then(|d| d.handle(line)) {
                replies.push(reply);
            }
        }
        drop(state);

        for reply in replies {
            self.pending.extend_from_slice(reply.as_bytes());
            self.pending.push(TERMINATOR);
        }
        Ok(data.len())
    }

    fn read_line(&mut self, max_len: usize, delimiter: u8) -> Result<String> {
        if !self.open {
            return Err(SerialError::NotConnected);
        }
        let end = match self.pending.iter().position(|&b| b == delimiter) {
            Some(pos) => pos + 1,
            None => self.pending.len(),
        };
        if end > max_len {
            return Err(SerialError::LineTooLong(max_len));
        }
        let line: Vec<u8> = self.pending.drain(..end).collect();
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

impl Drop for SimulatedTransport {
    fn drop(&mut self) {
        self.close();
    }
}
