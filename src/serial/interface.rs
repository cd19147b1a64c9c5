use super::codec::{self, Command, Reply, MAX_REPLY_LEN, TERMINATOR};
use super::transport::{LinkConfig, Transport};
use super::{Result, SerialError};

/// Owns one transport session and performs half-duplex exchanges over it.
///
/// The port is closed on `disconnect` and again, if still open, when the
/// interface is dropped.
pub struct SerialInterface<T: Transport> {
    transport: T,
    link: LinkConfig,
}

impl<T: Transport> SerialInterface<T> {
    pub fn new(transport: T, link: LinkConfig) -> Self {
        Self { transport, link }
    }

    /// Open `port_name` with the interface's link settings
    pub fn connect(&mut self, port_name: &str) -> Result<()> {
        self.configure(port_name);
        self.open()
    }

    /// Select the port for the next `open`, closing any current session
    pub fn configure(&mut self, port_name: &str) {
        if self.transport.is_open() {
            self.disconnect();
        }
        self.transport.configure(port_name, &self.link);
    }

    /// Open the configured port
    pub fn open(&mut self) -> Result<()> {
        self.transport.open()?;
        if let Some(name) = self.transport.port_name() {
            log::debug!("Connected to {}", name);
        }
        Ok(())
    }

    /// Close the current port, if any
    pub fn disconnect(&mut self) {
        if self.transport.is_open() {
            if let Some(name) = self.transport.port_name() {
                log::debug!("Disconnecting from {}", name);
            }
            self.transport.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    pub fn port_name(&self) -> Option<&str> {
        self.transport.port_name()
    }

    pub fn link(&self) -> &LinkConfig {
        &self.link
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Discard pending input, then write the whole command
    pub fn send(&mut self, command: &Command) -> Result<usize> {
        if !self.transport.is_open() {
            return Err(SerialError::NotConnected);
        }
        self.transport.clear_input()?;
        log::debug!("-> {}", command);
        self.transport.write_all(command.as_bytes())
    }

    /// Read and decode one reply line
    pub fn read_reply(&mut self) -> Result<Reply> {
        if !self.transport.is_open() {
            return Err(SerialError::NotConnected);
        }
        let line = self.transport.read_line(MAX_REPLY_LEN, TERMINATOR)?;
        let reply = codec::decode(&line);
        log::debug!("<- {:?}", reply.raw());
        Ok(reply)
    }

    /// Send a command and wait for its reply
    pub fn send_command(&mut self, command: &Command) -> Result<Reply> {
        self.send(command)?;
        self.read_reply()
    }
}

impl<T: Transport> Drop for SerialInterface<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
