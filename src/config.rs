//! Per-device registration settings and the bridge configuration file.

use crate::error::{PurifierError, Result};
use serde::Deserialize;
use std::path::Path;
use tokio::time::Duration;

pub const DEFAULT_NAME: &str = "Philips AirPurifier";
pub const DEFAULT_PROTOCOL: &str = "coap";
pub const DEFAULT_AIRCTRL: &str = "airctrl";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MQTT_PORT: u16 = 1883;

fn default_name() -> String {
    DEFAULT_NAME.to_string()
}

fn default_protocol() -> String {
    DEFAULT_PROTOCOL.to_string()
}

fn default_airctrl() -> String {
    DEFAULT_AIRCTRL.to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_probe_interval() -> u64 {
    DEFAULT_PROBE_INTERVAL_SECS
}

/// Settings for one purifier.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device address (required)
    pub host: String,
    #[serde(default = "default_name")]
    pub name: String,
    /// MQTT broker as `host` or `host:port`; publishing is disabled when absent
    #[serde(default)]
    pub mqtt: Option<String>,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    /// Path of the control tool
    #[serde(default = "default_airctrl")]
    pub airctrl: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

impl DeviceConfig {
    pub fn new<H: Into<String>>(host: H) -> Self {
        Self {
            host: host.into(),
            name: default_name(),
            mqtt: None,
            protocol: default_protocol(),
            airctrl: default_airctrl(),
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
        }
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    pub fn mqtt<B: Into<String>>(mut self, broker: B) -> Self {
        self.mqtt = Some(broker.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(PurifierError::Configuration("host is required".into()));
        }
        if self.poll_interval_secs == 0 || self.probe_interval_secs == 0 {
            return Err(PurifierError::Configuration(
                "intervals must be at least one second".into(),
            ));
        }
        if let Some(broker) = &self.mqtt {
            parse_broker(broker)?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    /// Broker address with the port resolved, if publishing is configured.
    pub fn broker(&self) -> Result<Option<(String, u16)>> {
        self.mqtt.as_deref().map(parse_broker).transpose()
    }
}

/// Accepts `host`, `host:port`, a bare IPv6 address or `[addr]:port`.
fn parse_broker(broker: &str) -> Result<(String, u16)> {
    let invalid = || PurifierError::Configuration(format!("invalid mqtt broker '{}'", broker));
    let broker = broker.trim();

    let (host, port) = if let Some(rest) = broker.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail {
            "" => (host, None),
            _ => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match broker.split_once(':') {
            Some((host, port)) if !port.contains(':') => (host, Some(port)),
            // No colon, or an unbracketed IPv6 address
            _ => (broker, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
        None => DEFAULT_MQTT_PORT,
    };
    Ok((host.to_string(), port))
}

/// Contents of the bridge configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub devices: Vec<DeviceConfig>,
}

impl BridgeConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: BridgeConfig = serde_json::from_str(text)?;
        for device in &config.devices {
            device.validate()?;
        }
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}
