//! Text codec for the management controller's command line
//!
//! Commands are plain strings. Status responses carry a colon-delimited
//! field list whose last field is the power state:
//! ```text
//! power: server power is currently: On
//! ```

use thiserror::Error;

use crate::Command;

/// Status query
pub const CMD_STATUS: &str = "power";

/// Power-on transition
pub const CMD_POWER_ON: &str = "power on";

/// Power-off transition
pub const CMD_POWER_OFF: &str = "power off";

/// Field delimiter in controller responses
pub const FIELD_DELIMITER: char = ':';

/// Errors that can occur while decoding device strings
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("Unknown device command: {0:?}")]
    UnknownCommand(String),
}

/// Power reading extracted from a status response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerReading {
    On,
    Off,
    /// Last field was neither "on" nor "off"
    Unrecognized(String),
}

/// Parse a free-text status response
///
/// Takes the last colon-delimited segment, trimmed and lowercased.
pub fn parse_response(response: &str) -> PowerReading {
    let token = response
        .rsplit(FIELD_DELIMITER)
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match token.as_str() {
        "on" => PowerReading::On,
        "off" => PowerReading::Off,
        _ => PowerReading::Unrecognized(token),
    }
}

/// Map a device command string back to a [`Command`]
pub fn decode_command(line: &str) -> Result<Command, CodecError> {
    match line.trim() {
        CMD_STATUS => Ok(Command::Status),
        CMD_POWER_ON => Ok(Command::PowerOn),
        CMD_POWER_OFF => Ok(Command::PowerOff),
        other => Err(CodecError::UnknownCommand(other.to_string())),
    }
}
