use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serialport::{
    ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits,
};

use super::{PortInfo, Result, SerialError};

// Applied Motion drive defaults: 9600 baud, 8 data bits, no parity, 1 stop bit
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Hardware id reported for on-board 16550-class UARTs
pub const RS232_HARDWARE_ID: &str = "PNP0501";

// Where the kernel exposes tty devices and their PNP/ACPI ids
const SYSFS_TTY_ROOT: &str = "/sys/class/tty";

// Per-device files holding a PNP id, tried in order
const SYSFS_ID_FILES: [&str; 2] = ["id", "firmware_node/hid"];

/// Read and write timing applied once when a port is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutProfile {
    /// Maximum wait for each byte of a reply
    pub inter_byte_ms: u64,
    /// Cap on the whole reply line
    pub overall_ms: u64,
    pub write_ms: u64,
}

impl TimeoutProfile {
    pub fn inter_byte(&self) -> Duration {
        Duration::from_millis(self.inter_byte_ms)
    }

    pub fn overall(&self) -> Duration {
        Duration::from_millis(self.overall_ms)
    }

    pub fn write(&self) -> Duration {
        Duration::from_millis(self.write_ms)
    }
}

impl Default for TimeoutProfile {
    fn default() -> Self {
        Self {
            inter_byte_ms: 100,
            overall_ms: 1000,
            write_ms: 200,
        }
    }
}

/// Line settings shared by every candidate port of the drive family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    pub timeouts: TimeoutProfile,
}

impl LinkConfig {
    pub fn new(baud_rate: u32, timeouts: TimeoutProfile) -> Self {
        Self {
            baud_rate,
            timeouts,
            ..Self::default()
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            timeouts: TimeoutProfile::default(),
        }
    }
}

/// Byte-level serial session used by the interface and the handshake.
///
/// `configure` only records settings; nothing touches the device until `open`.
pub trait Transport: Send {
    /// Select the port and line settings for the next `open`
    fn configure(&mut self, port_name: &str, link: &LinkConfig);

    fn open(&mut self) -> Result<()>;

    /// Close the session. Closing a closed transport is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Name of the configured port, if any
    fn port_name(&self) -> Option<&str>;

    /// Discard any bytes waiting in the input buffer
    fn clear_input(&mut self) -> Result<()>;

    fn write_all(&mut self, data: &[u8]) -> Result<usize>;

    /// Read bytes up to and including `delimiter`.
    ///
    /// A timeout ends the read early and returns whatever arrived, possibly
    /// nothing. Reaching `max_len` bytes without the delimiter is an error.
    fn read_line(&mut self, max_len: usize, delimiter: u8) -> Result<String>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn configure(&mut self, port_name: &str, link: &LinkConfig) {
        (**self).configure(port_name, link)
    }

    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn port_name(&self) -> Option<&str> {
        (**self).port_name()
    }

    fn clear_input(&mut self) -> Result<()> {
        (**self).clear_input()
    }

    fn write_all(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write_all(data)
    }

    fn read_line(&mut self, max_len: usize, delimiter: u8) -> Result<String> {
        (**self).read_line(max_len, delimiter)
    }
}

/// Source of serial ports visible to the host
pub trait PortEnumerator {
    fn available_ports(&self) -> Result<Vec<PortInfo>>;
}

/// Enumerates the host's ports through `serialport`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortEnumerator for SystemPorts {
    fn available_ports(&self) -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()?;
        let tty_root = Path::new(SYSFS_TTY_ROOT);
        Ok(ports
            .iter()
            .map(|port| PortInfo::new(port.port_name.clone(), port_hardware_id(port, tty_root)))
            .collect())
    }
}

/// Hardware id for an enumerated port.
///
/// The PNP id recorded by the kernel wins (on-board UARTs enumerate as
/// `Unknown` but carry `PNP0501` there). Without one, the tag is derived
/// from the port type.
pub fn port_hardware_id(port: &SerialPortInfo, tty_root: &Path) -> String {
    sysfs_hardware_id(tty_root, &port.port_name).unwrap_or_else(|| hardware_id_tag(&port.port_type))
}

/// PNP id of `port_name` under a sysfs tty tree, e.g. `/sys/class/tty`
pub fn sysfs_hardware_id(tty_root: &Path, port_name: &str) -> Option<String> {
    let tty = Path::new(port_name).file_name()?;
    let device = tty_root.join(tty).join("device");
    SYSFS_ID_FILES.iter().find_map(|file| {
        std::fs::read_to_string(device.join(file))
            .ok()
            .and_then(|contents| parse_pnp_id(&contents))
    })
}

/// First id listed in a sysfs id file. PNP devices list compatible ids one per line.
pub fn parse_pnp_id(contents: &str) -> Option<String> {
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Map a port type onto a hardware id when the platform reports none
pub fn hardware_id_tag(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::UsbPort(usb_info) => {
            format!("USB VID:PID={:04X}:{:04X}", usb_info.vid, usb_info.pid)
        }
        SerialPortType::BluetoothPort => "BTHENUM".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// Byte source with a settable read timeout, the part of a serial port
/// `read_line` depends on
pub trait TimedReader: Read {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()>;
}

impl TimedReader for Box<dyn SerialPort> {
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<()> {
        SerialPort::set_timeout(self.as_mut(), timeout)?;
        Ok(())
    }
}

/// Read up to and including `delimiter`, giving up at the overall deadline.
///
/// Each byte waits at most the inter-byte timeout. A timeout returns the
/// partial line.
pub fn read_line_from<R>(reader: &mut R, timeouts: TimeoutProfile, max_len: usize, delimiter: u8) -> Result<String>
where
    R: TimedReader + ?Sized,
{
    let deadline = Instant::now() + timeouts.overall();
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        reader.set_read_timeout(timeouts.inter_byte().min(deadline - now))?;

        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == delimiter {
                    break;
                }
                if line.len() >= max_len {
                    return Err(SerialError::LineTooLong(max_len));
                }
            }
            Err(ref e) if e.kind() == ErrorKind::TimedOut => break,
            Err(e) => return Err(SerialError::IoError(e)),
        }
    }

    Ok(String::from_utf8_lossy(&line).into_owned())
}

/// `Transport` backed by a real serial port
pub struct SerialPortTransport {
    port_name: Option<String>,
    link: LinkConfig,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialPortTransport {
    pub fn new() -> Self {
        Self {
            port_name: None,
            link: LinkConfig::default(),
            port: None,
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or(SerialError::NotConnected)
    }
}

impl Default for SerialPortTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn map_io(e: std::io::Error) -> SerialError {
    if e.kind() == ErrorKind::TimedOut {
        SerialError::Timeout
    } else {
        SerialError::IoError(e)
    }
}

impl Transport for SerialPortTransport {
    fn configure(&mut self, port_name: &str, link: &LinkConfig) {
        self.port_name = Some(port_name.to_string());
        self.link = *link;
    }

    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Err(SerialError::ConnectionFailed("Port already open".to_string()));
        }
        let name = self
            .port_name
            .clone()
            .ok_or_else(|| SerialError::PortNotFound("No port configured".to_string()))?;

        let port = serialport::new(&name, self.link.baud_rate)
            .data_bits(self.link.data_bits)
            .parity(self.link.parity)
            .stop_bits(self.link.stop_bits)
            .flow_control(self.link.flow_control)
            .timeout(self.link.timeouts.inter_byte())
            .open()
            .map_err(|e| SerialError::ConnectionFailed(format!("{}: {}", name, e)))?;

        self.port = Some(port);
        log::debug!("Opened {} at {} baud", name, self.link.baud_rate);
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            log::debug!("Closed {}", self.port_name.as_deref().unwrap_or("<unset>"));
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    fn clear_input(&mut self) -> Result<()> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<usize> {
        let write_timeout = self.link.timeouts.write();
        let port = self.port_mut()?;
        port.set_timeout(write_timeout)?;
        Write::write_all(port, data).map_err(map_io)?;
        Write::flush(port).map_err(map_io)?;
        Ok(data.len())
    }

    fn read_line(&mut self, max_len: usize, delimiter: u8) -> Result<String> {
        let timeouts = self.link.timeouts;
        read_line_from(self.port_mut()?, timeouts, max_len, delimiter)
    }
}
