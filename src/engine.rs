//! Power engine
//!
//! This module handles:
//! - Owning the session manager, reconciler and command queue
//! - Starting the session loop and, on first readiness, the scheduler
//! - Answering caller queries and power intents

use crate::command::{CommandExecutor, CommandQueue, Scheduler};
use crate::config::TimingConfig;
use crate::session::{SessionEvent, SessionManager};
use crate::transport::ShellConnector;
use anyhow::bail;
use ilo_shared::state_machine::{IntentRejected, PowerStateMachine, ReconcilerSnapshot};
use ilo_shared::{ActualPowerState, RequestedPowerState};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Why a caller request could not be served
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EngineError {
    /// No ready session to the controller
    #[error("SSH not connected")]
    Unavailable,

    /// The server is already in the requested state
    #[error("{rejected}")]
    Conflict {
        rejected: IntentRejected,
        power_state: ActualPowerState,
    },
}

/// Power status as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PowerStatus {
    pub connected: bool,
    pub scheduler_running: bool,
    pub power_state: ActualPowerState,
    pub powered_on: bool,
    pub requested_state: RequestedPowerState,
    pub unrecognized_responses: u64,
}

impl PowerStatus {
    fn from_snapshot(
        connected: bool,
        scheduler_running: bool,
        snapshot: ReconcilerSnapshot,
    ) -> Self {
        Self {
            connected,
            scheduler_running,
            power_state: snapshot.actual,
            powered_on: snapshot.actual == ActualPowerState::Started,
            requested_state: snapshot.requested,
            unrecognized_responses: snapshot.unrecognized_responses,
        }
    }
}

/// Holds every piece of mutable service state
pub struct PowerEngine {
    session: Arc<SessionManager>,
    reconciler: Arc<RwLock<PowerStateMachine>>,
    queue: Arc<Mutex<CommandQueue>>,
    timing: TimingConfig,
    events: Mutex<Option<mpsc::UnboundedReceiver<SessionEvent>>>,
    scheduler_started: AtomicBool,
    scheduler_task: Mutex<Option<JoinHandle<()>>>,
}

/// Background tasks of a started engine
pub struct EngineHandle {
    engine: Arc<PowerEngine>,
    session_task: JoinHandle<()>,
    supervisor_task: JoinHandle<()>,
}

impl EngineHandle {
    /// Stop all background tasks and close the session
    pub async fn shutdown(self) {
        self.supervisor_task.abort();
        self.session_task.abort();
        if let Some(task) = self.engine.scheduler_task.lock().await.take() {
            task.abort();
        }
        self.engine.session.disconnect("service shutting down").await;
        info!("Power engine stopped");
    }
}

impl PowerEngine {
    pub fn new(connector: Arc<dyn ShellConnector>, timing: TimingConfig) -> Self {
        let (session, events) = SessionManager::new(connector, timing.clone());

        Self {
            session: Arc::new(session),
            reconciler: Arc::new(RwLock::new(PowerStateMachine::new())),
            queue: Arc::new(Mutex::new(CommandQueue::new())),
            timing,
            events: Mutex::new(Some(events)),
            scheduler_started: AtomicBool::new(false),
            scheduler_task: Mutex::new(None),
        }
    }

    /// Spawn the session loop and the event supervisor
    ///
    /// The scheduler is started by the supervisor on the first `Ready` event
    /// and keeps running across later reconnects.
    pub async fn start(self: &Arc<Self>) -> anyhow::Result<EngineHandle> {
        let Some(events) = self.events.lock().await.take() else {
            bail!("Power engine already started");
        };

        let session_task = tokio::spawn(self.session.clone().run());
        let supervisor_task = tokio::spawn(self.clone().supervise(events));
        info!("Power engine started");

        Ok(EngineHandle {
            engine: self.clone(),
            session_task,
            supervisor_task,
        })
    }

    async fn supervise(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Connected { endpoint } => {
                    info!("Connected to iLO at {}", endpoint);
                }
                SessionEvent::Ready => {
                    if self.start_scheduler().await {
                        info!("First session ready; scheduler running");
                    } else {
                        debug!("Session ready again");
                    }
                }
                SessionEvent::Disconnected { reason } => {
                    info!("Session closed: {}", reason);
                }
                SessionEvent::ConnectFailed { reason } => {
                    debug!("Connect attempt failed: {}", reason);
                }
            }
        }
        debug!("Session event channel closed");
    }

    /// Start the scheduler unless it is already running
    async fn start_scheduler(&self) -> bool {
        if self.scheduler_started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let executor = CommandExecutor::new(self.session.clone(), self.reconciler.clone());
        let scheduler = Scheduler::new(
            self.queue.clone(),
            self.reconciler.clone(),
            executor,
            self.timing.clone(),
        );
        *self.scheduler_task.lock().await = Some(tokio::spawn(scheduler.run()));
        true
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler_started.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> ReconcilerSnapshot {
        self.reconciler.read().await.snapshot()
    }

    async fn ensure_ready(&self) -> Result<(), EngineError> {
        if self.session.is_connected().await {
            Ok(())
        } else {
            Err(EngineError::Unavailable)
        }
    }

    /// Current power status; never served while the session is down
    pub async fn query_state(&self) -> Result<PowerStatus, EngineError> {
        self.ensure_ready().await?;
        let snapshot = self.snapshot().await;
        Ok(PowerStatus::from_snapshot(true, self.scheduler_running(), snapshot))
    }

    /// Record an intent to power the server on
    pub async fn request_power_on(&self) -> Result<PowerStatus, EngineError> {
        self.ensure_ready().await?;

        let mut reconciler = self.reconciler.write().await;
        if let Err(rejected) = reconciler.request_on() {
            debug!("Power on rejected: {}", rejected);
            return Err(EngineError::Conflict {
                rejected,
                power_state: reconciler.actual(),
            });
        }
        info!("Power on requested (currently {})", reconciler.actual());

        Ok(PowerStatus::from_snapshot(true, self.scheduler_running(), reconciler.snapshot()))
    }

    /// Record an intent to power the server off
    pub async fn request_power_off(&self) -> Result<PowerStatus, EngineError> {
        self.ensure_ready().await?;

        let mut reconciler = self.reconciler.write().await;
        if let Err(rejected) = reconciler.request_off() {
            debug!("Power off rejected: {}", rejected);
            return Err(EngineError::Conflict {
                rejected,
                power_state: reconciler.actual(),
            });
        }
        info!("Power off requested (currently {})", reconciler.actual());

        Ok(PowerStatus::from_snapshot(true, self.scheduler_running(), reconciler.snapshot()))
    }
}
