//! In-memory controller used in tests to script sessions and record commands.

use crate::transport::traits::{ShellConnector, ShellSession};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use ilo_shared::{codec, Command};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct DeviceState {
    powered_on: bool,
    failing_connects: u32,
    connects: u32,
    open_sessions: u32,
    received: Vec<String>,
    scripted: VecDeque<String>,
    exec_delay: Option<Duration>,
}

/// Simulated iLO: answers `power` queries and flips power on transitions
#[derive(Clone, Default)]
pub struct FakeDevice {
    state: Arc<Mutex<DeviceState>>,
}

impl FakeDevice {
    pub fn new(powered_on: bool) -> Self {
        let device = Self::default();
        device.state.lock().unwrap().powered_on = powered_on;
        device
    }

    /// Make the next `count` connect attempts fail
    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().unwrap().failing_connects = count;
    }

    /// Return `response` for the next command instead of simulating it
    pub fn script_response(&self, response: impl Into<String>) {
        self.state.lock().unwrap().scripted.push_back(response.into());
    }

    /// Delay every command by `delay`
    pub fn set_exec_delay(&self, delay: Duration) {
        self.state.lock().unwrap().exec_delay = Some(delay);
    }

    pub fn powered_on(&self) -> bool {
        self.state.lock().unwrap().powered_on
    }

    pub fn connects(&self) -> u32 {
        self.state.lock().unwrap().connects
    }

    pub fn open_sessions(&self) -> u32 {
        self.state.lock().unwrap().open_sessions
    }

    /// Command lines received, oldest first
    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }

    fn respond(&self, line: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.received.push(line.to_string());

        if let Some(response) = state.scripted.pop_front() {
            return Ok(response);
        }

        let response = match codec::decode_command(line)? {
            Command::Status => format!(
                "status=0\nstatus_tag=COMMAND COMPLETED\npower: server power is currently: {}\n",
                if state.powered_on { "On" } else { "Off" }
            ),
            Command::PowerOn => {
                state.powered_on = true;
                "status=0\nstatus_tag=COMMAND COMPLETED\nServer powering on .......\n".into()
            }
            Command::PowerOff => {
                state.powered_on = false;
                "status=0\nstatus_tag=COMMAND COMPLETED\nServer powering off .......\n".into()
            }
        };
        Ok(response)
    }
}

pub struct FakeSession {
    device: FakeDevice,
    closed: Mutex<bool>,
}

#[async_trait]
impl ShellSession for FakeSession {
    async fn exec(&self, command: &str) -> Result<String> {
        if *self.closed.lock().unwrap() {
            bail!("session closed");
        }
        let delay = self.device.state.lock().unwrap().exec_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.device.respond(command)
    }

    async fn close(&self) -> Result<()> {
        let mut closed = self.closed.lock().unwrap();
        if !*closed {
            *closed = true;
            self.device.state.lock().unwrap().open_sessions -= 1;
        }
        Ok(())
    }
}

pub struct FakeConnector {
    device: FakeDevice,
}

impl FakeConnector {
    pub fn new(device: FakeDevice) -> Self {
        Self { device }
    }
}

#[async_trait]
impl ShellConnector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn ShellSession>> {
        {
            let mut state = self.device.state.lock().unwrap();
            state.connects += 1;
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(anyhow!("connection refused"));
            }
            state.open_sessions += 1;
        }

        Ok(Arc::new(FakeSession {
            device: self.device.clone(),
            closed: Mutex::new(false),
        }))
    }

    fn name(&self) -> &'static str {
        "Fake"
    }

    fn endpoint(&self) -> String {
        "fake-ilo:22".into()
    }
}
