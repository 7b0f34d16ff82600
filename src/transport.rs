//! Collaborators that reach the appliance: the command transport and the
//! reachability probe.

use crate::command::DeviceCommand;
use crate::error::{PurifierError, Result};
use async_trait::async_trait;
use log::debug;
use std::process::Stdio;
use tokio::process::Command;

const PING_OK: &str = "1 packets received";

/// Executes one command against the device and returns its text output.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, command: &DeviceCommand) -> Result<String>;
}

/// Reports whether the device currently answers on the network.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Runs the `airctrl` control tool as a subprocess.
#[derive(Debug, Clone)]
pub struct AirctrlTransport {
    program: String,
    host: String,
    protocol: String,
}

impl AirctrlTransport {
    pub fn new<P, H, R>(program: P, host: H, protocol: R) -> Self
    where
        P: Into<String>,
        H: Into<String>,
        R: Into<String>,
    {
        Self {
            program: program.into(),
            host: host.into(),
            protocol: protocol.into(),
        }
    }
}

#[async_trait]
impl Transport for AirctrlTransport {
    async fn execute(&self, command: &DeviceCommand) -> Result<String> {
        debug!(
            "{} --ipaddr {} --protocol {} {}",
            self.program, self.host, self.protocol, command
        );
        let output = Command::new(&self.program)
            .arg("--ipaddr")
            .arg(&self.host)
            .arg("--protocol")
            .arg(&self.protocol)
            .args(command.args())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    PurifierError::Transport(format!("{} not found", self.program))
                } else {
                    PurifierError::Transport(format!("failed to run {}: {}", self.program, e))
                }
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() || !stdout.is_empty() {
            Ok(stdout)
        } else {
            Err(PurifierError::Transport(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }
}

/// Single ICMP echo through the system `ping` binary.
#[derive(Debug, Clone)]
pub struct PingProbe {
    host: String,
}

impl PingProbe {
    pub fn new<H: Into<String>>(host: H) -> Self {
        Self { host: host.into() }
    }
}

#[async_trait]
impl LivenessProbe for PingProbe {
    async fn is_reachable(&self) -> bool {
        let output = Command::new("ping")
            .arg(&self.host)
            .arg("-c")
            .arg("1")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) => String::from_utf8_lossy(&out.stdout).contains(PING_OK),
            Err(e) => {
                debug!("ping {} failed: {}", self.host, e);
                false
            }
        }
    }
}
