//! Command pipeline for the management controller
//!
//! This module handles:
//! - Queueing status polls and power transitions in FIFO order
//! - Dispatching one command at a time over the session
//! - Feeding status responses back into the reconciler

mod executor;
mod queue;
mod scheduler;

pub use executor::CommandExecutor;
pub use queue::CommandQueue;
pub use scheduler::Scheduler;
