//! SSH transport for the iLO command line
//!
//! `ssh2` is a blocking library, so every call runs on the blocking pool.
//! The session handle sits behind a mutex; only one call uses it at a time.

use crate::config::DeviceConfig;
use crate::transport::traits::{ShellConnector, ShellSession};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ssh2::{MethodType, Session};
use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Key exchange offered by iLO3 firmware
pub const KEX_ALGORITHMS: &str = "diffie-hellman-group14-sha1";

/// Host key types offered by iLO3 firmware
pub const HOST_KEY_ALGORITHMS: &str = "ssh-rsa,ssh-dss";

/// SSH session wrapper implementing ShellSession
pub struct SshSession {
    inner: Arc<Mutex<Session>>,
}

impl SshSession {
    fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }
}

#[async_trait]
impl ShellSession for SshSession {
    async fn exec(&self, command: &str) -> Result<String> {
        let inner = self.inner.clone();
        let command = command.to_string();

        tokio::task::spawn_blocking(move || -> Result<String> {
            let session = inner
                .lock()
                .map_err(|_| anyhow!("SSH session lock poisoned"))?;

            let mut channel = session.channel_session()?;
            channel.exec(&command)?;

            let mut output = String::new();
            channel
                .read_to_string(&mut output)
                .with_context(|| format!("Failed to read output of {:?}", command))?;
            channel.wait_close()?;

            Ok(output)
        })
        .await?
    }

    async fn close(&self) -> Result<()> {
        let inner = self.inner.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let session = inner
                .lock()
                .map_err(|_| anyhow!("SSH session lock poisoned"))?;
            session.disconnect(None, "Disconnecting", None)?;
            Ok(())
        })
        .await?
    }
}

/// SSH connector for the iLO management processor
pub struct SshConnector {
    config: DeviceConfig,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(
        config: DeviceConfig,
        connect_timeout: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            config,
            connect_timeout,
            command_timeout,
        }
    }
}

/// libssh2 blocking-call timeout in milliseconds (0 would mean no timeout)
fn blocking_timeout_ms(timeout: Duration) -> u32 {
    timeout.as_millis().clamp(1, u32::MAX as u128) as u32
}

/// Open, handshake and authenticate a blocking SSH session
///
/// `timeout` bounds the connect, handshake and authentication; `exec_timeout`
/// replaces it once the session is authenticated.
fn open_session(
    config: &DeviceConfig,
    timeout: Duration,
    exec_timeout: Duration,
) -> Result<Session> {
    let addr = (config.host.as_str(), config.port)
        .to_socket_addrs()
        .with_context(|| format!("Failed to resolve {}", config.host))?
        .next()
        .ok_or_else(|| anyhow!("No address found for {}", config.host))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .with_context(|| format!("Failed to connect to {}", addr))?;

    let mut session = Session::new()?;
    session.set_timeout(blocking_timeout_ms(timeout));
    session.method_pref(MethodType::Kex, KEX_ALGORITHMS)?;
    session.method_pref(MethodType::HostKey, HOST_KEY_ALGORITHMS)?;
    session.set_tcp_stream(tcp);
    session.handshake().context("SSH handshake failed")?;

    session
        .userauth_password(&config.username, &config.password)
        .context("SSH password authentication failed")?;
    if !session.authenticated() {
        bail!("SSH authentication rejected for user {}", config.username);
    }

    session.set_timeout(blocking_timeout_ms(exec_timeout));
    Ok(session)
}

#[async_trait]
impl ShellConnector for SshConnector {
    async fn connect(&self) -> Result<Arc<dyn ShellSession>> {
        let config = self.config.clone();
        let connect_timeout = self.connect_timeout;
        let command_timeout = self.command_timeout;

        let session = tokio::task::spawn_blocking(move || {
            open_session(&config, connect_timeout, command_timeout)
        })
        .await??;
        Ok(Arc::new(SshSession::new(session)))
    }

    fn name(&self) -> &'static str {
        "SSH"
    }

    fn endpoint(&self) -> String {
        format!("{}@{}:{}", self.config.username, self.config.host, self.config.port)
    }
}
