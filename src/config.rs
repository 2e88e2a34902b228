//! Service configuration loaded from the environment

use ilo_shared::timing;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Default SSH port on the management controller
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default HTTP port, bound on all interfaces
pub const DEFAULT_HTTP_PORT: u16 = 3547;

/// Default requests allowed per client per window
pub const DEFAULT_RATE_LIMIT: u32 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Management controller endpoint and credentials
#[derive(Clone)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Timing for the session lifecycle and the scheduler
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Grace delay after connect before the session is flagged ready
    pub settle_delay: Duration,
    /// Session age at which it is torn down and rebuilt
    pub session_lifetime: Duration,
    /// Pause between a planned disconnect and the next connect
    pub reconnect_delay: Duration,
    /// First delay after a failed connect (doubles on each failure)
    pub connect_retry_delay: Duration,
    pub max_connect_retry_delay: Duration,
    pub connect_timeout: Duration,
    /// Producer period
    pub produce_interval: Duration,
    /// Consumer period (scheduler tick)
    pub consume_interval: Duration,
    pub command_timeout: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(timing::SETTLE_DELAY_MS),
            session_lifetime: Duration::from_millis(timing::SESSION_LIFETIME_MS),
            reconnect_delay: Duration::from_millis(timing::RECONNECT_DELAY_MS),
            connect_retry_delay: Duration::from_millis(timing::CONNECT_RETRY_DELAY_MS),
            max_connect_retry_delay: Duration::from_millis(timing::MAX_CONNECT_RETRY_DELAY_MS),
            connect_timeout: Duration::from_millis(timing::CONNECT_TIMEOUT_MS),
            produce_interval: Duration::from_millis(timing::PRODUCE_INTERVAL_MS),
            consume_interval: Duration::from_millis(timing::CONSUME_INTERVAL_MS),
            command_timeout: Duration::from_millis(timing::COMMAND_TIMEOUT_MS),
        }
    }
}

/// Per-client request throttling
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT,
            window: Duration::from_secs(1),
        }
    }
}

/// Configuration for the whole service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub device: DeviceConfig,
    pub listen_addr: SocketAddr,
    pub rate_limit: RateLimitConfig,
    pub timing: TimingConfig,
}

impl ServiceConfig {
    /// Load from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let device = DeviceConfig {
            host: required("SSH_HOST")?,
            port: parse_or(&lookup, "SSH_PORT", DEFAULT_SSH_PORT)?,
            username: required("SSH_USERNAME")?,
            password: required("SSH_PASSWORD")?,
        };

        let listen_addr = parse_or(
            &lookup,
            "ILO_LISTEN_ADDR",
            SocketAddr::from(([0, 0, 0, 0], DEFAULT_HTTP_PORT)),
        )?;

        let rate_limit = RateLimitConfig {
            max_requests: parse_or(&lookup, "ILO_RATE_LIMIT", DEFAULT_RATE_LIMIT)?,
            ..Default::default()
        };

        Ok(Self {
            device,
            listen_addr,
            rate_limit,
            timing: TimingConfig::default(),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(value) if !value.is_empty() => value
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        _ => Ok(default),
    }
}
