//! SCL command encoding and reply decoding.
//!
//! Commands are an opcode, an optional numeric parameter and a carriage
//! return. Replies are single `\r`-terminated lines, usually `KEY=value`.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use super::{Result, SerialError};

pub const TERMINATOR: u8 = b'\r';

/// Largest command the drive accepts in one line
pub const MAX_COMMAND_LEN: usize = 64;

/// Longest reply line accepted before the read is abandoned
pub const MAX_REPLY_LEN: usize = 65536;

// Power-up sequence prefix, followed by firmware version and model number
const POWER_UP_PREFIX: &str = "255";

/// Numeric command parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Param {
    /// Plain decimal integer
    Int(i64),
    /// Decimal with exactly three fractional digits
    Fixed3(f64),
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Param::Int(value) => write!(f, "{}", value),
            Param::Fixed3(value) => write!(f, "{:.3}", value),
        }
    }
}

/// A fully encoded command line, terminator included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    opcode: String,
    line: String,
}

impl Command {
    /// Opcode with no parameter, used for queries and bare actions
    pub fn query(opcode: &str) -> Result<Self> {
        encode(opcode, None)
    }

    pub fn with_param(opcode: &str, param: Param) -> Result<Self> {
        encode(opcode, Some(param))
    }

    /// `255<firmware><model>\r`, both numbers unpadded
    pub fn power_up(firmware_version: u32, model_number: u32) -> Self {
        let mut line = String::with_capacity(MAX_COMMAND_LEN);
        // u32 digits always fit the buffer, writing to a String cannot fail
        let _ = write!(line, "{}{}{}", POWER_UP_PREFIX, firmware_version, model_number);
        line.push(TERMINATOR as char);
        Self {
            opcode: POWER_UP_PREFIX.to_string(),
            line,
        }
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.line.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.line.trim_end_matches(TERMINATOR as char))
    }
}

/// Encode `opcode` and an optional parameter into a command line
pub fn encode(opcode: &str, param: Option<Param>) -> Result<Command> {
    if opcode.is_empty() || !opcode.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(SerialError::InvalidCommand(format!("bad opcode {:?}", opcode)));
    }
    if let Some(Param::Fixed3(value)) = param {
        if !value.is_finite() {
            return Err(SerialError::InvalidCommand(format!("{} parameter is {}", opcode, value)));
        }
    }

    let mut line = String::with_capacity(MAX_COMMAND_LEN);
    line.push_str(opcode);
    if let Some(param) = param {
        let _ = write!(line, "{}", param);
    }
    line.push(TERMINATOR as char);

    if line.len() > MAX_COMMAND_LEN {
        return Err(SerialError::CommandTooLong {
            len: line.len(),
            max: MAX_COMMAND_LEN,
        });
    }

    Ok(Command {
        opcode: opcode.to_string(),
        line,
    })
}

/// A decoded reply line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    line: String,
    key: Option<String>,
    value: String,
}

/// Split a reply line into its optional `KEY=` prefix and value.
///
/// With `=` past the first byte the value is the first whitespace-delimited
/// token after it. Otherwise the whole line (minus the terminator) is the value.
pub fn decode(line: &str) -> Reply {
    let line = line.strip_suffix(TERMINATOR as char).unwrap_or(line);

    let (key, value) = match line.find('=') {
        Some(pos) if pos > 0 => (
            Some(line[..pos].to_string()),
            line[pos + 1..].split_whitespace().next().unwrap_or("").to_string(),
        ),
        _ => (None, line.to_string()),
    };

    Reply {
        line: line.to_string(),
        key,
        value,
    }
}

impl Reply {
    /// Full line without the terminator
    pub fn raw(&self) -> &str {
        &self.line
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn into_value(self) -> String {
        self.value
    }

    /// True when nothing arrived before the read timed out
    pub fn is_empty(&self) -> bool {
        self.line.is_empty()
    }

    /// Drive negative acknowledgement (`?` optionally followed by an error code)
    pub fn is_rejected(&self) -> bool {
        self.value.starts_with('?')
    }

    /// Base-10 integer value
    pub fn as_int<T: FromStr>(&self) -> Result<T> {
        self.value.parse().map_err(|_| self.invalid("integer"))
    }

    /// Hexadecimal value, with or without a `0x` prefix
    pub fn as_hex(&self) -> Result<u32> {
        let digits = self
            .value
            .strip_prefix("0x")
            .or_else(|| self.value.strip_prefix("0X"))
            .unwrap_or(self.value.as_str());
        u32::from_str_radix(digits, 16).map_err(|_| self.invalid("hexadecimal"))
    }

    pub fn as_float(&self) -> Result<f64> {
        match self.value.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.invalid("float")),
        }
    }

    fn invalid(&self, kind: &'static str) -> SerialError {
        SerialError::InvalidValue {
            opcode: self.key.clone().unwrap_or_default(),
            kind,
            value: self.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_integer_parameter() {
        let cmd = encode("AC", Some(Param::Int(100))).unwrap();
        assert_eq!(cmd.as_bytes(), b"AC100\r");
        assert_eq!(cmd.opcode(), "AC");
        assert_eq!(cmd.to_string(), "AC100");
    }

    #[test]
    fn test_encode_fixed3_parameter() {
        let cmd = Command::with_param("JS", Param::Fixed3(12.5)).unwrap();
        assert_eq!(cmd.as_bytes(), b"JS12.500\r");

        let cmd = Command::with_param("CS", Param::Fixed3(-0.25)).unwrap();
        assert_eq!(cmd.as_bytes(), b"CS-0.250\r");
    }

    #[test]
    fn test_encode_query() {
        assert_eq!(Command::query("MV").unwrap().as_bytes(), b"MV\r");
    }

    #[test]
    fn test_power_up_is_unpadded() {
        assert_eq!(Command::power_up(6, 20).as_bytes(), b"255620\r");
        assert_eq!(Command::power_up(106, 3).as_bytes(), b"2551063\r");
    }

    #[test]
    fn test_encode_rejects_bad_opcodes() {
        assert!(matches!(encode("", None), Err(SerialError::InvalidCommand(_))));
        assert!(matches!(encode("A C", None), Err(SerialError::InvalidCommand(_))));
        assert!(matches!(encode("AC\r", None), Err(SerialError::InvalidCommand(_))));
        assert!(matches!(
            encode("JS", Some(Param::Fixed3(f64::NAN))),
            Err(SerialError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_encode_is_bounded() {
        let result = encode("JS", Some(Param::Fixed3(1e80)));
        assert!(matches!(result, Err(SerialError::CommandTooLong { max: 64, .. })));
    }

    #[test]
    fn test_decode_key_value() {
        let reply = decode("AC=100\r");
        assert_eq!(reply.key(), Some("AC"));
        assert_eq!(reply.value(), "100");
        assert_eq!(reply.as_int::<u32>().unwrap(), 100);
    }

    #[test]
    fn test_decode_takes_first_token() {
        let reply = decode("JS=  2.500 extra\r");
        assert_eq!(reply.value(), "2.500");
        assert_eq!(decode("AC=\r").value(), "");
    }

    #[test]
    fn test_decode_without_key() {
        let reply = decode("106G020\r");
        assert_eq!(reply.key(), None);
        assert_eq!(reply.value(), "106G020");

        let reply = decode("=5\r");
        assert_eq!(reply.key(), None);
        assert_eq!(reply.value(), "=5");
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode("AL=0002\r").as_hex().unwrap(), 2);
        assert_eq!(decode("AL=0x00A0\r").as_hex().unwrap(), 0xA0);
    }

    #[test]
    fn test_parse_failures_are_typed() {
        let err = decode("AC=fast\r").as_int::<u32>().unwrap_err();
        match err {
            SerialError::InvalidValue { opcode, kind, value } => {
                assert_eq!(opcode, "AC");
                assert_eq!(kind, "integer");
                assert_eq!(value, "fast");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(decode("").as_float().is_err());
        assert!(decode("AL=zz\r").as_hex().is_err());
    }

    #[test]
    fn test_rejection_detected() {
        assert!(decode("?4\r").is_rejected());
        assert!(!decode("%\r").is_rejected());
        assert!(decode("").is_empty());
    }
}
