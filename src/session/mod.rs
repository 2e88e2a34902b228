//! Session management for the management controller
//!
//! This module handles:
//! - Owning the single command session to the iLO
//! - The connect / settle / ready / reconnect lifecycle
//! - Executing commands only while the session is ready

mod manager;

pub use manager::{SessionError, SessionEvent, SessionManager};
