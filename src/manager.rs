//! Host-platform side of the integration.
//! Registers devices as entities, routes service calls to them, shares bus
//! connections and merges every device's events into one stream.

use crate::command::{Function, HumidityTarget, LightBrightness};
use crate::config::DeviceConfig;
use crate::device::{Device, DeviceBuilder, DeviceEvent};
use crate::error::{PurifierError, Result};
use crate::publisher::{MqttBus, StatePublisher};
use futures_util::{Stream, StreamExt};
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

/// Common prefix of every service this integration registers.
pub const SERVICE_PREFIX: &str = "philips_air_purifier_coap_set";

const KEY_ENTITY_ID: &str = "entity_id";
const KEY_HUMIDITY: &str = "humidity";
const KEY_FUNCTION: &str = "function";
const KEY_BRIGHTNESS: &str = "brightness";
const KEY_STATE: &str = "state";

/// The services exposed to the host, without their common prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Humidity,
    Function,
    LightBrightness,
    ChildLock,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Humidity,
        Service::Function,
        Service::LightBrightness,
        Service::ChildLock,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Service::Humidity => "humidity",
            Service::Function => "function",
            Service::LightBrightness => "light_brightness",
            Service::ChildLock => "child_lock",
        }
    }

    /// Full service name as registered with the host.
    pub fn name(&self) -> String {
        format!("{}_{}", SERVICE_PREFIX, self.suffix())
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let suffix = name.strip_prefix(SERVICE_PREFIX)?.strip_prefix('_')?;
        Service::ALL.into_iter().find(|s| s.suffix() == suffix)
    }
}

/// A service invocation routed from the host platform.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceCall {
    pub service: String,
    #[serde(default)]
    pub data: Value,
}

impl ServiceCall {
    pub fn new<S: Into<String>>(service: S, data: Value) -> Self {
        Self {
            service: service.into(),
            data,
        }
    }

    /// Option values may arrive as strings or as bare numbers.
    fn option(&self, field: &'static str) -> Result<String> {
        match self.data.get(field) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            Some(other) => Err(PurifierError::invalid_option(field, other.to_string())),
            None => Err(PurifierError::invalid_option(field, "<missing>")),
        }
    }

    /// Accepts the host's usual boolean spellings.
    fn flag(&self, field: &'static str) -> Result<bool> {
        let raw = match self.data.get(field) {
            Some(Value::Bool(b)) => return Ok(*b),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.to_lowercase(),
            Some(other) => return Err(PurifierError::invalid_option(field, other.to_string())),
            None => return Err(PurifierError::invalid_option(field, "<missing>")),
        };
        match raw.as_str() {
            "1" | "true" | "yes" | "on" | "enable" => Ok(true),
            "0" | "false" | "no" | "off" | "disable" => Ok(false),
            _ => Err(PurifierError::invalid_option(field, raw)),
        }
    }
}

/// Represents an event from any device managed by the Manager.
#[derive(Debug, Clone)]
pub struct ManagerEvent {
    pub entity_id: String,
    pub event: DeviceEvent,
}

/// Registry of purifier entities for one host instance.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    devices: RwLock<HashMap<String, Device>>,
    device_tokens: RwLock<HashMap<String, CancellationToken>>,
    // One connection per broker address, shared by every device using it
    buses: parking_lot::Mutex<HashMap<(String, u16), MqttBus>>,
    event_tx: broadcast::Sender<ManagerEvent>,
    cancel_token: CancellationToken,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    /// Create a new Manager.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(ManagerInner {
                devices: RwLock::new(HashMap::new()),
                device_tokens: RwLock::new(HashMap::new()),
                buses: parking_lot::Mutex::new(HashMap::new()),
                event_tx,
                cancel_token: CancellationToken::new(),
            }),
        }
    }

    /// Returns a Stream of events from all managed devices.
    pub fn stream(&self) -> impl Stream<Item = ManagerEvent> + Send + 'static {
        BroadcastStream::new(self.inner.event_tx.subscribe())
            .filter_map(|event| async move { event.ok() })
    }

    /// Creates a device from `config` and registers it.
    ///
    /// Returns an error on invalid configuration or when the entity ID is
    /// already taken.
    pub async fn add(&self, config: DeviceConfig) -> Result<Device> {
        config.validate()?;
        let publisher = self.publisher_for(&config)?;
        let device = DeviceBuilder::new(config).publisher(publisher).build()?;
        self.insert(device.clone()).await?;
        Ok(device)
    }

    /// Registers an already built device.
    pub async fn insert(&self, device: Device) -> Result<()> {
        let mut devices = self.inner.devices.write().await;
        let mut device_tokens = self.inner.device_tokens.write().await;

        let entity_id = device.entity_id().to_string();
        if devices.contains_key(&entity_id) {
            device.stop();
            return Err(PurifierError::DuplicateDevice(entity_id));
        }

        let token = self.inner.cancel_token.child_token();
        self.spawn_device_monitor(&device, token.clone());

        devices.insert(entity_id.clone(), device);
        device_tokens.insert(entity_id.clone(), token);

        info!("Device {} added to manager", entity_id);
        Ok(())
    }

    fn publisher_for(&self, config: &DeviceConfig) -> Result<StatePublisher> {
        let Some(broker) = config.broker()? else {
            return Ok(StatePublisher::disabled());
        };

        let mut buses = self.inner.buses.lock();
        let bus = buses
            .entry(broker)
            .or_insert_with_key(|(host, port)| {
                let client_id = format!("philair-{}", std::process::id());
                MqttBus::connect(&client_id, host, *port)
            })
            .clone();
        Ok(StatePublisher::new(Arc::new(bus)))
    }

    fn spawn_device_monitor(&self, device: &Device, token: CancellationToken) {
        let entity_id = device.entity_id().to_string();
        let event_tx = self.inner.event_tx.clone();
        // Subscribe before spawning so no event is missed
        let stream = device.stream();

        tokio::spawn(async move {
            tokio::pin!(stream);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = stream.next() => match event {
                        Some(event) => {
                            let _ = event_tx.send(ManagerEvent {
                                entity_id: entity_id.clone(),
                                event,
                            });
                        }
                        None => break,
                    },
                }
            }
            info!("Event forwarding for {} ended", entity_id);
        });
    }

    /// Routes a service call to the entity named in its data.
    pub async fn call_service(&self, call: &ServiceCall) -> Result<()> {
        let service = Service::from_name(&call.service)
            .ok_or_else(|| PurifierError::UnknownService(call.service.clone()))?;
        let entity_id = call
            .data
            .get(KEY_ENTITY_ID)
            .and_then(Value::as_str)
            .ok_or_else(|| PurifierError::invalid_option(KEY_ENTITY_ID, "<missing>"))?;
        let device = self
            .get(entity_id)
            .await
            .ok_or_else(|| PurifierError::DeviceNotFound(entity_id.to_string()))?;

        match service {
            Service::Humidity => {
                let target: HumidityTarget = call.option(KEY_HUMIDITY)?.parse()?;
                device.set_humidity(target).await;
            }
            Service::Function => {
                let function: Function = call.option(KEY_FUNCTION)?.parse()?;
                device.set_function(function).await;
            }
            Service::LightBrightness => {
                let level: LightBrightness = call.option(KEY_BRIGHTNESS)?.parse()?;
                device.set_light_brightness(level).await;
            }
            Service::ChildLock => {
                device.set_child_lock(call.flag(KEY_STATE)?).await;
            }
        }
        Ok(())
    }

    /// Remove a device from the manager and stop its timers.
    pub async fn remove(&self, entity_id: &str) {
        let mut devices = self.inner.devices.write().await;
        let mut device_tokens = self.inner.device_tokens.write().await;

        if let Some(device) = devices.remove(entity_id) {
            if let Some(token) = device_tokens.remove(entity_id) {
                token.cancel();
            }
            device.stop();
            info!("Device {} removed from manager", entity_id);
        } else {
            warn!("Attempted to remove non-existent device {}", entity_id);
        }
    }

    /// Entity ID -> liveness flag (local state, no network request).
    pub async fn list(&self) -> HashMap<String, bool> {
        let devices = self.inner.devices.read().await;
        devices
            .iter()
            .map(|(id, device)| (id.clone(), device.is_online()))
            .collect()
    }

    /// Get a device by entity ID.
    pub async fn get(&self, entity_id: &str) -> Option<Device> {
        self.inner.devices.read().await.get(entity_id).cloned()
    }

    /// Stop every device, bus connection and event forwarder.
    pub async fn shutdown(&self) {
        self.inner.cancel_token.cancel();

        let mut devices = self.inner.devices.write().await;
        let mut tokens = self.inner.device_tokens.write().await;
        for (_, device) in devices.drain() {
            device.stop();
        }
        tokens.clear();

        for (_, bus) in self.inner.buses.lock().drain() {
            bus.stop();
        }
        info!("Manager shut down");
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        // Trigger cancellation for background tasks.
        self.cancel_token.cancel();

        if let Ok(devices) = self.devices.try_read() {
            for device in devices.values() {
                device.stop();
            }
        }
    }
}
