//! Command executor - sends one command and feeds the response to the reconciler

use crate::session::{SessionError, SessionManager};
use ilo_shared::codec::{self, PowerReading};
use ilo_shared::state_machine::{PowerStateMachine, TransitionResult};
use ilo_shared::Command;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Result of command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Command ran; status queries carry the parsed reading
    Completed {
        command: Command,
        reading: Option<PowerReading>,
    },
    /// Command was sent but the transport failed or timed out
    Failed { command: Command, message: String },
    /// Command was not sent
    Skipped { command: Command, reason: String },
}

/// Executes commands over the controller session
pub struct CommandExecutor {
    session: Arc<SessionManager>,
    reconciler: Arc<RwLock<PowerStateMachine>>,
}

impl CommandExecutor {
    pub fn new(session: Arc<SessionManager>, reconciler: Arc<RwLock<PowerStateMachine>>) -> Self {
        Self {
            session,
            reconciler,
        }
    }

    /// Execute a command and apply its outcome
    ///
    /// Failures are logged and the command is dropped; nothing is re-queued.
    pub async fn execute(&self, command: Command) -> CommandResult {
        if !self.reconciler.read().await.is_still_needed(command) {
            debug!("Dropping stale command: {}", command);
            return CommandResult::Skipped {
                command,
                reason: "no longer needed".into(),
            };
        }

        match command {
            Command::Status => debug!("Fetching power state..."),
            Command::PowerOn => info!("Starting server..."),
            Command::PowerOff => info!("Stopping server..."),
        }

        let response = match self.session.execute(command).await {
            Ok(response) => response,
            Err(SessionError::NotConnected) => {
                debug!("Skipping {}: session not connected", command);
                return CommandResult::Skipped {
                    command,
                    reason: SessionError::NotConnected.to_string(),
                };
            }
            Err(e) => {
                warn!("Command {:?} failed: {}", command.as_device_str(), e);
                return CommandResult::Failed {
                    command,
                    message: e.to_string(),
                };
            }
        };

        if command != Command::Status {
            debug!("  Response: {}", response.trim());
            return CommandResult::Completed {
                command,
                reading: None,
            };
        }

        let reading = codec::parse_response(&response);
        let mut reconciler = self.reconciler.write().await;
        let requested_before = reconciler.requested();

        match reconciler.apply_reading(reading.clone()) {
            TransitionResult::Changed { from, to } => {
                info!("Power state changed: {} -> {}", from, to);
            }
            TransitionResult::Unchanged(state) => {
                debug!("Power state: {}", state);
            }
            TransitionResult::Ignored { token } => {
                debug!("Unrecognized power response {:?}; state unchanged", token);
            }
        }

        if requested_before != reconciler.requested() {
            info!("Requested power state {} reached", requested_before);
        }

        CommandResult::Completed {
            command,
            reading: Some(reading),
        }
    }
}
