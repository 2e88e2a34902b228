//! Scheduler - produces reconciliation commands and dispatches them in order

use super::executor::{CommandExecutor, CommandResult};
use super::queue::CommandQueue;
use crate::config::TimingConfig;
use ilo_shared::state_machine::PowerStateMachine;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Single loop that produces and consumes on one timer
///
/// Every tick first produces (when the produce interval has elapsed) and then
/// dispatches at most one command, awaiting its completion before the next
/// tick. Completion order therefore equals dispatch order.
pub struct Scheduler {
    queue: Arc<Mutex<CommandQueue>>,
    reconciler: Arc<RwLock<PowerStateMachine>>,
    executor: CommandExecutor,
    timing: TimingConfig,
}

impl Scheduler {
    pub fn new(
        queue: Arc<Mutex<CommandQueue>>,
        reconciler: Arc<RwLock<PowerStateMachine>>,
        executor: CommandExecutor,
        timing: TimingConfig,
    ) -> Self {
        Self {
            queue,
            reconciler,
            executor,
            timing,
        }
    }

    /// Producer step: a status poll plus any needed transition command
    pub async fn produce(&self) {
        let commands = self.reconciler.read().await.commands_to_enqueue();

        let mut queue = self.queue.lock().await;
        if !queue.is_empty() {
            debug!("{} commands still pending from earlier ticks", queue.len());
        }
        queue.extend(commands.iter().copied());
        debug!(
            "Queued {:?} (pending: {}, total: {})",
            commands,
            queue.len(),
            queue.enqueued_total()
        );
    }

    /// Consumer step: dispatch the oldest command, if any
    pub async fn consume_one(&self) -> Option<CommandResult> {
        let command = self.queue.lock().await.pop()?;
        debug!("Dispatching {}", command);

        let result = self.executor.execute(command).await;
        if let CommandResult::Failed { command, message } = &result {
            warn!("Dropped {} after failure: {}", command, message);
        }
        Some(result)
    }

    /// Run forever
    pub async fn run(self) {
        info!(
            "Scheduler started (produce every {:?}, dispatch every {:?})",
            self.timing.produce_interval, self.timing.consume_interval
        );

        let mut ticker = interval(self.timing.consume_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_produced: Option<Instant> = None;

        loop {
            ticker.tick().await;

            let now = Instant::now();
            let due = last_produced
                .map_or(true, |at| now.duration_since(at) >= self.timing.produce_interval);
            if due {
                self.produce().await;
                last_produced = Some(now);
            }

            self.consume_one().await;
        }
    }
}
