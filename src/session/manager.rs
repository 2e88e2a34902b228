//! Session manager with a periodic reconnect cycle

use crate::config::TimingConfig;
use crate::transport::{ShellConnector, ShellSession};
use ilo_shared::Command;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Lifecycle phase of the controller session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    /// Connected, waiting out the grace delay
    Settling,
    Ready,
    Disconnecting,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Disconnected => write!(f, "disconnected"),
            SessionPhase::Connecting => write!(f, "connecting"),
            SessionPhase::Settling => write!(f, "settling"),
            SessionPhase::Ready => write!(f, "ready"),
            SessionPhase::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Events emitted by the session manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Transport connected and authenticated
    Connected { endpoint: String },
    /// Grace delay elapsed; commands may be sent
    Ready,
    /// Session torn down
    Disconnected { reason: String },
    /// Connect attempt failed
    ConnectFailed { reason: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("SSH not connected")]
    NotConnected,

    #[error("Command timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Owns the single session to the management controller
pub struct SessionManager {
    connector: Arc<dyn ShellConnector>,
    timing: TimingConfig,
    phase: RwLock<SessionPhase>,
    session: RwLock<Option<Arc<dyn ShellSession>>>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionManager {
    /// Create a session manager and the receiver for its events
    pub fn new(
        connector: Arc<dyn ShellConnector>,
        timing: TimingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let manager = Self {
            connector,
            timing,
            phase: RwLock::new(SessionPhase::Disconnected),
            session: RwLock::new(None),
            event_tx,
        };

        (manager, event_rx)
    }

    pub async fn phase(&self) -> SessionPhase {
        *self.phase.read().await
    }

    /// Only a settled session counts as connected
    pub async fn is_connected(&self) -> bool {
        self.phase().await == SessionPhase::Ready
    }

    async fn set_phase(&self, phase: SessionPhase) {
        *self.phase.write().await = phase;
        debug!("Session phase: {}", phase);
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Open a new session, replacing any existing one
    ///
    /// On success the session is left in `Settling`; it is not usable until
    /// `mark_ready` runs.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.session.read().await.is_some() {
            self.disconnect("replaced by new connection").await;
        }

        self.set_phase(SessionPhase::Connecting).await;
        info!(
            "Connecting to iLO via {} ({})",
            self.connector.name(),
            self.connector.endpoint()
        );

        let result = match timeout(self.timing.connect_timeout, self.connector.connect()).await {
            Ok(Ok(session)) => Ok(session),
            Ok(Err(e)) => Err(SessionError::Transport(e)),
            Err(_) => Err(SessionError::Timeout(self.timing.connect_timeout)),
        };

        match result {
            Ok(session) => {
                *self.session.write().await = Some(session);
                self.set_phase(SessionPhase::Settling).await;
                self.emit(SessionEvent::Connected {
                    endpoint: self.connector.endpoint(),
                });
                Ok(())
            }
            Err(e) => {
                self.set_phase(SessionPhase::Disconnected).await;
                self.emit(SessionEvent::ConnectFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Flag a settled session as ready for commands
    pub async fn mark_ready(&self) -> bool {
        let mut phase = self.phase.write().await;
        if *phase != SessionPhase::Settling {
            return false;
        }
        *phase = SessionPhase::Ready;
        drop(phase);

        self.emit(SessionEvent::Ready);
        true
    }

    /// Tear down the current session, if any
    pub async fn disconnect(&self, reason: &str) {
        self.set_phase(SessionPhase::Disconnecting).await;

        let session = self.session.write().await.take();
        if let Some(session) = session {
            info!("Disconnecting from iLO: {}", reason);
            if let Err(e) = session.close().await {
                warn!("Error while closing session: {}", e);
            }
            self.emit(SessionEvent::Disconnected {
                reason: reason.to_string(),
            });
        }

        self.set_phase(SessionPhase::Disconnected).await;
    }

    /// Send one command over the ready session and return its raw output
    pub async fn execute(&self, command: Command) -> Result<String, SessionError> {
        if !self.is_connected().await {
            return Err(SessionError::NotConnected);
        }

        let session = self
            .session
            .read()
            .await
            .clone()
            .ok_or(SessionError::NotConnected)?;

        match timeout(self.timing.command_timeout, session.exec(command.as_device_str())).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(SessionError::Transport(e)),
            Err(_) => Err(SessionError::Timeout(self.timing.command_timeout)),
        }
    }

    /// Main reconnect loop; never returns
    ///
    /// connect → settle → ready → (lifetime) → disconnect → short pause → …
    /// Failed connects back off exponentially up to the configured maximum.
    pub async fn run(self: Arc<Self>) {
        let mut retry_delay = self.timing.connect_retry_delay;

        loop {
            match self.connect().await {
                Ok(()) => {
                    retry_delay = self.timing.connect_retry_delay;

                    sleep(self.timing.settle_delay).await;
                    self.mark_ready().await;
                    info!("Session ready");

                    // Lifetime is measured from the connect
                    let remaining = self
                        .timing
                        .session_lifetime
                        .saturating_sub(self.timing.settle_delay);
                    sleep(remaining).await;

                    self.disconnect("session lifetime elapsed").await;
                    sleep(self.timing.reconnect_delay).await;
                }
                Err(e) => {
                    warn!("Connect failed: {} (retrying in {:?})", e, retry_delay);
                    sleep(retry_delay).await;
                    retry_delay = std::cmp::min(retry_delay * 2, self.timing.max_connect_retry_delay);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::{FakeConnector, FakeDevice};

    fn manager(device: &FakeDevice) -> (Arc<SessionManager>, mpsc::UnboundedReceiver<SessionEvent>) {
        let (manager, events) = SessionManager::new(
            Arc::new(FakeConnector::new(device.clone())),
            TimingConfig::default(),
        );
        (Arc::new(manager), events)
    }

    #[tokio::test]
    async fn test_execute_refused_until_ready() {
        let device = FakeDevice::new(false);
        let (manager, _events) = manager(&device);

        assert!(matches!(
            manager.execute(Command::Status).await,
            Err(SessionError::NotConnected)
        ));

        manager.connect().await.unwrap();
        assert_eq!(manager.phase().await, SessionPhase::Settling);
        assert!(!manager.is_connected().await);
        assert!(matches!(
            manager.execute(Command::Status).await,
            Err(SessionError::NotConnected)
        ));
        assert!(device.received().is_empty());

        assert!(manager.mark_ready().await);
        let output = manager.execute(Command::Status).await.unwrap();
        assert!(output.contains("currently: Off"));
        assert_eq!(device.received(), vec!["power".to_string()]);
    }

    #[tokio::test]
    async fn test_disconnect_closes_session() {
        let device = FakeDevice::new(true);
        let (manager, mut events) = manager(&device);

        manager.connect().await.unwrap();
        manager.mark_ready().await;
        assert_eq!(device.open_sessions(), 1);

        manager.disconnect("test").await;
        assert_eq!(manager.phase().await, SessionPhase::Disconnected);
        assert_eq!(device.open_sessions(), 0);
        assert!(matches!(
            manager.execute(Command::Status).await,
            Err(SessionError::NotConnected)
        ));

        assert!(matches!(events.recv().await, Some(SessionEvent::Connected { .. })));
        assert_eq!(events.recv().await, Some(SessionEvent::Ready));
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::Disconnected { reason: "test".into() })
        );
    }

    #[tokio::test]
    async fn test_mark_ready_requires_settling() {
        let device = FakeDevice::new(false);
        let (manager, _events) = manager(&device);

        assert!(!manager.mark_ready().await);
        assert_eq!(manager.phase().await, SessionPhase::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_failure_reported() {
        let device = FakeDevice::new(false);
        device.fail_next_connects(1);
        let (manager, mut events) = manager(&device);

        assert!(matches!(
            manager.connect().await,
            Err(SessionError::Transport(_))
        ));
        assert_eq!(manager.phase().await, SessionPhase::Disconnected);
        assert!(matches!(events.recv().await, Some(SessionEvent::ConnectFailed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout() {
        let device = FakeDevice::new(false);
        device.set_exec_delay(Duration::from_secs(120));
        let (manager, _events) = manager(&device);

        manager.connect().await.unwrap();
        manager.mark_ready().await;

        assert!(matches!(
            manager.execute(Command::Status).await,
            Err(SessionError::Timeout(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_cycles_sessions() {
        let device = FakeDevice::new(false);
        let (manager, _events) = manager(&device);

        tokio::spawn(manager.clone().run());

        sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.phase().await, SessionPhase::Settling);

        sleep(Duration::from_secs(1)).await;
        assert!(manager.is_connected().await);
        assert_eq!(device.connects(), 1);

        // Past the 5 minute lifetime and the reconnect pause
        sleep(Duration::from_secs(300)).await;
        assert_eq!(device.connects(), 2);
        assert_eq!(device.open_sessions(), 1);
        assert!(manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_retries_failed_connect_with_backoff() {
        let device = FakeDevice::new(false);
        device.fail_next_connects(2);
        let (manager, _events) = manager(&device);

        tokio::spawn(manager.clone().run());

        // Attempts at 0s and 5s fail, 15s succeeds
        sleep(Duration::from_secs(6)).await;
        assert_eq!(device.connects(), 2);
        assert!(!manager.is_connected().await);

        sleep(Duration::from_secs(10)).await;
        assert_eq!(device.connects(), 3);
        assert!(manager.is_connected().await);
    }
}
