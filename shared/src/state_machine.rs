//! Power Reconciliation State Machine
//!
//! Tracks the actual power state reported by the controller against the state
//! a caller requested, and decides which commands are needed to converge them.

use thiserror::Error;

use crate::codec::PowerReading;
use crate::{ActualPowerState, Command, RequestedPowerState};

/// Why a caller intent was refused
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum IntentRejected {
    #[error("Already on")]
    AlreadyStarted,
    #[error("Already off")]
    AlreadyStopped,
}

/// Result of applying a status reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    /// Actual state changed
    Changed {
        from: ActualPowerState,
        to: ActualPowerState,
    },
    /// Reading matched the current actual state
    Unchanged(ActualPowerState),
    /// Reading could not be interpreted; state untouched
    Ignored { token: String },
}

/// Read-only view of the reconciler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerSnapshot {
    pub actual: ActualPowerState,
    pub requested: RequestedPowerState,
    pub unrecognized_responses: u64,
    pub last_unrecognized: Option<String>,
}

/// The power reconciliation state machine
#[derive(Debug, Default)]
pub struct PowerStateMachine {
    actual: ActualPowerState,
    requested: RequestedPowerState,
    unrecognized_responses: u64,
    last_unrecognized: Option<String>,
}

impl PowerStateMachine {
    /// Create a state machine with nothing known and nothing requested
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actual(&self) -> ActualPowerState {
        self.actual
    }

    pub fn requested(&self) -> RequestedPowerState {
        self.requested
    }

    pub fn snapshot(&self) -> ReconcilerSnapshot {
        ReconcilerSnapshot {
            actual: self.actual,
            requested: self.requested,
            unrecognized_responses: self.unrecognized_responses,
            last_unrecognized: self.last_unrecognized.clone(),
        }
    }

    /// Apply a parsed status response
    ///
    /// The actual state is updated first; a requested state that is now
    /// satisfied is then cleared back to `Unknown`.
    pub fn apply_reading(&mut self, reading: PowerReading) -> TransitionResult {
        let result = match reading {
            PowerReading::On => self.set_actual(ActualPowerState::Started),
            PowerReading::Off => self.set_actual(ActualPowerState::Stopped),
            PowerReading::Unrecognized(token) => {
                self.unrecognized_responses += 1;
                self.last_unrecognized = Some(token.clone());
                TransitionResult::Ignored { token }
            }
        };

        self.clear_satisfied_request();
        result
    }

    fn set_actual(&mut self, to: ActualPowerState) -> TransitionResult {
        let from = self.actual;
        self.actual = to;
        if from == to {
            TransitionResult::Unchanged(to)
        } else {
            TransitionResult::Changed { from, to }
        }
    }

    fn clear_satisfied_request(&mut self) {
        match (self.requested, self.actual) {
            (RequestedPowerState::On, ActualPowerState::Started)
            | (RequestedPowerState::Off, ActualPowerState::Stopped) => {
                self.requested = RequestedPowerState::Unknown;
            }
            _ => {}
        }
    }

    /// Caller intent: turn the server on
    pub fn request_on(&mut self) -> Result<(), IntentRejected> {
        if self.actual == ActualPowerState::Started {
            return Err(IntentRejected::AlreadyStarted);
        }
        self.requested = RequestedPowerState::On;
        Ok(())
    }

    /// Caller intent: turn the server off
    pub fn request_off(&mut self) -> Result<(), IntentRejected> {
        if self.actual == ActualPowerState::Stopped {
            return Err(IntentRejected::AlreadyStopped);
        }
        self.requested = RequestedPowerState::Off;
        Ok(())
    }

    /// Transition command needed right now, if any
    ///
    /// Only fires from a known opposite state; with `Unknown` actual state the
    /// next status poll has to land first.
    pub fn transition_command(&self) -> Option<Command> {
        match (self.requested, self.actual) {
            (RequestedPowerState::On, ActualPowerState::Stopped) => Some(Command::PowerOn),
            (RequestedPowerState::Off, ActualPowerState::Started) => Some(Command::PowerOff),
            _ => None,
        }
    }

    /// Commands for one producer tick: always a status poll, then the
    /// transition command if one is needed
    pub fn commands_to_enqueue(&self) -> Vec<Command> {
        let mut commands = vec![Command::Status];
        commands.extend(self.transition_command());
        commands
    }

    /// Whether a transition command is still wanted at dispatch time
    pub fn is_still_needed(&self, command: Command) -> bool {
        match command {
            Command::Status => true,
            Command::PowerOn => {
                self.requested == RequestedPowerState::On
                    && self.actual != ActualPowerState::Started
            }
            Command::PowerOff => {
                self.requested == RequestedPowerState::Off
                    && self.actual != ActualPowerState::Stopped
            }
        }
    }
}
