use std::fmt;

use serde::{Deserialize, Serialize};

use super::codec::{Command, Param, Reply};
use super::transport::Transport;
use super::{Result, SerialError, SerialInterface};

/// SCL opcodes used by the drive link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    AccelerationRate,
    AlarmCode,
    AlarmReset,
    JogAcceleration,
    JogSpeed,
    CommenceJogging,
    ChangeSpeed,
    StopJogging,
    ModelRevision,
}

impl Opcode {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::AccelerationRate => "AC",
            Opcode::AlarmCode => "AL",
            Opcode::AlarmReset => "AR",
            Opcode::JogAcceleration => "JA",
            Opcode::JogSpeed => "JS",
            Opcode::CommenceJogging => "CJ",
            Opcode::ChangeSpeed => "CS",
            Opcode::StopJogging => "SJ",
            Opcode::ModelRevision => "MV",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Alarm bit field reported by `AL`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmCode(pub u32);

impl AlarmCode {
    pub fn is_clear(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_set(&self, bit: u32) -> bool {
        bit < 32 && self.0 & (1 << bit) != 0
    }
}

impl fmt::Display for AlarmCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Applied Motion SCL command set over a serial interface.
///
/// Every call is one write followed by at most one read; there is never
/// more than one command in flight.
pub struct DriveProtocol<T: Transport> {
    interface: SerialInterface<T>,
}

impl<T: Transport> DriveProtocol<T> {
    pub fn new(interface: SerialInterface<T>) -> Self {
        Self { interface }
    }

    /// Send the power-up sequence for the given identity.
    ///
    /// The drive does not answer it; whatever arrives before the timeout is
    /// drained and ignored.
    pub fn power_up(&mut self, firmware_version: u32, model_number: u32) -> Result<()> {
        let command = Command::power_up(firmware_version, model_number);
        self.interface.send_command(&command)?;
        Ok(())
    }

    /// Raw model/firmware string, e.g. `106G020` for firmware 1.06G model 20
    pub fn model_revision(&mut self) -> Result<String> {
        let reply = self.query(Opcode::ModelRevision)?;
        Ok(reply.into_value())
    }

    /// Acceleration rate in rev/s²
    pub fn set_acc_rate(&mut self, acceleration_rate: u32) -> Result<()> {
        self.execute(Opcode::AccelerationRate, Some(Param::Int(i64::from(acceleration_rate))))
    }

    /// Get the acceleration rate in rev/s²
    pub fn get_acc_rate(&mut self) -> Result<u32> {
        let reply = self.query(Opcode::AccelerationRate)?;
        reply.as_int().map_err(|e| relabel(e, Opcode::AccelerationRate))
    }

    /// Get the alarm bits, sent by the drive as hex
    pub fn get_alarm_code(&mut self) -> Result<AlarmCode> {
        let reply = self.query(Opcode::AlarmCode)?;
        reply
            .as_hex()
            .map(AlarmCode)
            .map_err(|e| relabel(e, Opcode::AlarmCode))
    }

    /// Clear drive faults. Written without waiting for a reply.
    pub fn reset_alarm(&mut self) -> Result<()> {
        let command = Command::query(Opcode::AlarmReset.mnemonic())?;
        self.interface.send(&command)?;
        Ok(())
    }

    /// Jog acceleration in rev/s², sent with three decimals
    pub fn set_jog_acc(&mut self, jogging_acc: f64) -> Result<()> {
        self.execute(Opcode::JogAcceleration, Some(Param::Fixed3(jogging_acc)))
    }

    pub fn get_jog_acc(&mut self) -> Result<f64> {
        let reply = self.query(Opcode::JogAcceleration)?;
        reply.as_float().map_err(|e| relabel(e, Opcode::JogAcceleration))
    }

    pub fn set_jog_speed(&mut self, jogging_speed: f64) -> Result<()> {
        self.execute(Opcode::JogSpeed, Some(Param::Fixed3(jogging_speed)))
    }

    pub fn get_jog_speed(&mut self) -> Result<f64> {
        let reply = self.query(Opcode::JogSpeed)?;
        reply.as_float().map_err(|e| relabel(e, Opcode::JogSpeed))
    }

    /// Start jogging at the configured speed
    pub fn commence_jogging(&mut self) -> Result<()> {
        self.execute(Opcode::CommenceJogging, None)
    }

    /// Change jog speed while the motor is moving
    pub fn change_jog_speed(&mut self, jogging_speed: f64) -> Result<()> {
        self.execute(Opcode::ChangeSpeed, Some(Param::Fixed3(jogging_speed)))
    }

    /// Stop jogging using the configured deceleration
    pub fn stop_jogging(&mut self) -> Result<()> {
        self.execute(Opcode::StopJogging, None)
    }

    /// Get reference to the serial interface
    pub fn interface(&self) -> &SerialInterface<T> {
        &self.interface
    }

    /// Get mutable reference to the serial interface
    pub fn interface_mut(&mut self) -> &mut SerialInterface<T> {
        &mut self.interface
    }

    fn execute(&mut self, opcode: Opcode, param: Option<Param>) -> Result<()> {
        let command = match param {
            Some(param) => Command::with_param(opcode.mnemonic(), param)?,
            None => Command::query(opcode.mnemonic())?,
        };
        let reply = self.interface.send_command(&command)?;
        check_rejected(opcode, &reply)
    }

    fn query(&mut self, opcode: Opcode) -> Result<Reply> {
        let command = Command::query(opcode.mnemonic())?;
        let reply = self.interface.send_command(&command)?;
        check_rejected(opcode, &reply)?;
        Ok(reply)
    }
}

fn check_rejected(opcode: Opcode, reply: &Reply) -> Result<()> {
    if reply.is_rejected() {
        log::warn!("Drive rejected {}: {}", opcode, reply.raw());
        return Err(SerialError::Rejected {
            opcode: opcode.to_string(),
            reply: reply.raw().to_string(),
        });
    }
    Ok(())
}

fn relabel(err: SerialError, opcode: Opcode) -> SerialError {
    match err {
        SerialError::InvalidValue { kind, value, .. } => SerialError::InvalidValue {
            opcode: opcode.to_string(),
            kind,
            value,
        },
        other => other,
    }
}
