//! Transport trait abstraction for the management controller's command session

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// An open command session on the controller
#[async_trait]
pub trait ShellSession: Send + Sync + 'static {
    /// Run one command line and return its textual output
    async fn exec(&self, command: &str) -> Result<String>;

    /// Close the session gracefully
    async fn close(&self) -> Result<()>;
}

/// Factory for creating controller sessions
#[async_trait]
pub trait ShellConnector: Send + Sync + 'static {
    /// Attempt to connect and authenticate, returning a session on success
    async fn connect(&self) -> Result<Arc<dyn ShellSession>>;

    /// Human-readable name for this transport
    fn name(&self) -> &'static str;

    /// Where this connector points, for logging
    fn endpoint(&self) -> String;
}
