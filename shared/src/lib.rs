//! iLO Power Shared Types
//!
//! This crate provides the power-state types, the device command codec and the
//! reconciliation state machine shared by the iLO power service.

pub mod codec;
pub mod state_machine;

use serde::Serialize;

/// Last power state reported by the management controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActualPowerState {
    /// No status response parsed yet
    #[default]
    Unknown,
    /// Server is powered on
    Started,
    /// Server is powered off
    Stopped,
}

impl std::fmt::Display for ActualPowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActualPowerState::Unknown => write!(f, "unknown"),
            ActualPowerState::Started => write!(f, "started"),
            ActualPowerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Power state a caller asked for, pending reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestedPowerState {
    /// Nothing pending
    #[default]
    Unknown,
    On,
    Off,
}

impl std::fmt::Display for RequestedPowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestedPowerState::Unknown => write!(f, "unknown"),
            RequestedPowerState::On => write!(f, "on"),
            RequestedPowerState::Off => write!(f, "off"),
        }
    }
}

/// Commands sent to the management controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Query the current power state
    Status,
    /// Press the virtual power button on
    PowerOn,
    /// Power the server off
    PowerOff,
}

impl Command {
    /// Device-level instruction for this command
    pub fn as_device_str(&self) -> &'static str {
        match self {
            Command::Status => codec::CMD_STATUS,
            Command::PowerOn => codec::CMD_POWER_ON,
            Command::PowerOff => codec::CMD_POWER_OFF,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_device_str())
    }
}

/// Timing parameters for the session and scheduler loops
pub mod timing {
    /// Grace delay between a successful connect and flagging the session ready
    pub const SETTLE_DELAY_MS: u64 = 500;

    /// How long a session lives before it is torn down and rebuilt
    pub const SESSION_LIFETIME_MS: u64 = 5 * 60 * 1000;

    /// Delay between a planned disconnect and the next connect
    pub const RECONNECT_DELAY_MS: u64 = 500;

    /// Initial delay after a failed connect attempt
    pub const CONNECT_RETRY_DELAY_MS: u64 = 5_000;

    /// Maximum delay between failed connect attempts
    pub const MAX_CONNECT_RETRY_DELAY_MS: u64 = 60_000;

    /// Connect + handshake + authentication timeout
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// Producer period: status polls and reconciliation commands
    pub const PRODUCE_INTERVAL_MS: u64 = 4_000;

    /// Consumer period: at most one command dispatched per tick
    pub const CONSUME_INTERVAL_MS: u64 = 2_000;

    /// Upper bound for a single remote command
    pub const COMMAND_TIMEOUT_MS: u64 = 30_000;
}
