//! Command-session transports for the management controller

#[cfg(test)]
pub mod fake;
pub mod ssh;
pub mod traits;

pub use ssh::SshConnector;
pub use traits::{ShellConnector, ShellSession};
