//! Individual purifier synchronization and state management.
//! Handles periodic status polling, liveness probing, intent application
//! with bounded resend, and republishing of refreshed state.

use crate::attributes::{self, AttributeRecord, PowerState, SPEED_LIST, SpeedState};
use crate::command::{DeviceCommand, Function, HumidityTarget, Intent, LightBrightness, translate};
use crate::config::DeviceConfig;
use crate::error::{ERR_PARSE, ERR_TRANSPORT, PurifierError, Result, get_error_message};
use crate::publisher::StatePublisher;
use crate::resend::ResendController;
use crate::transport::{AirctrlTransport, LivenessProbe, PingProbe, Transport};
use futures_core::stream::Stream;
use log::{debug, error, info};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

pub const ICON: &str = "mdi:air-purifier";

/// Capability flag: the entity accepts speed selection.
pub const SUPPORT_SET_SPEED: u32 = 1;

const ENTITY_DOMAIN: &str = "fan";

/// Notifications emitted by a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// A poll replaced the attribute record
    AttributesUpdated(AttributeRecord),
    /// The liveness probe changed its verdict
    LivenessChanged(bool),
}

/// State owned by one device; written only by its poll and probe paths.
struct DeviceState {
    attributes: Option<AttributeRecord>,
    online: bool,
}

/// Builder for [`Device`], allowing the collaborators to be replaced.
pub struct DeviceBuilder {
    config: DeviceConfig,
    transport: Option<Arc<dyn Transport>>,
    probe: Option<Arc<dyn LivenessProbe>>,
    publisher: StatePublisher,
    sync_task: bool,
}

impl DeviceBuilder {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            transport: None,
            probe: None,
            publisher: StatePublisher::disabled(),
            sync_task: true,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn probe(mut self, probe: Arc<dyn LivenessProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn publisher(mut self, publisher: StatePublisher) -> Self {
        self.publisher = publisher;
        self
    }

    /// Whether to start the background poll and probe timers (default: true).
    ///
    /// Without them the owner drives [`Device::poll`] and [`Device::update`].
    pub fn sync_task(mut self, enabled: bool) -> Self {
        self.sync_task = enabled;
        self
    }

    /// Validates the configuration and creates the device.
    ///
    /// Must be called from within a tokio runtime when the sync task is enabled.
    pub fn build(self) -> Result<Device> {
        self.config.validate()?;
        let config = self.config;

        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(AirctrlTransport::new(
                config.airctrl.clone(),
                config.host.clone(),
                config.protocol.clone(),
            ))
        });
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(PingProbe::new(config.host.clone())));

        let (broadcast_tx, _) = broadcast::channel(16);
        let device = Device {
            entity_id: entity_id_for(&config.name),
            name: config.name.clone(),
            host: config.host.clone(),
            resend: Arc::new(ResendController::new(transport.clone())),
            transport,
            probe,
            publisher: self.publisher,
            state: Arc::new(RwLock::new(DeviceState {
                attributes: None,
                online: false,
            })),
            poll_lock: Arc::new(Mutex::new(())),
            intent_lock: Arc::new(Mutex::new(())),
            broadcast_tx,
            cancel_token: CancellationToken::new(),
        };

        if self.sync_task {
            device.spawn_sync_tasks(config.poll_interval(), config.probe_interval());
        }
        Ok(device)
    }
}

/// Represents one configured purifier and keeps its state in sync.
#[derive(Clone)]
pub struct Device {
    entity_id: String,
    name: String,
    host: String,

    transport: Arc<dyn Transport>,
    probe: Arc<dyn LivenessProbe>,
    resend: Arc<ResendController>,
    publisher: StatePublisher,

    // Shared mutable state
    state: Arc<RwLock<DeviceState>>,

    // Serializes record replacement
    poll_lock: Arc<Mutex<()>>,
    // Serializes intents, including their follow-up poll
    intent_lock: Arc<Mutex<()>>,

    broadcast_tx: broadcast::Sender<DeviceEvent>,
    cancel_token: CancellationToken,
}

impl Device {
    // -------------------------------------------------------------------------
    // Public API
    // -------------------------------------------------------------------------

    /// Creates a device talking to the real control tool, with the
    /// background timers running.
    pub fn new(config: DeviceConfig, publisher: StatePublisher) -> Result<Self> {
        DeviceBuilder::new(config).publisher(publisher).build()
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn icon(&self) -> &'static str {
        ICON
    }

    pub fn supported_features(&self) -> u32 {
        SUPPORT_SET_SPEED
    }

    pub fn speed_list(&self) -> Vec<&'static str> {
        SPEED_LIST.iter().map(SpeedState::as_str).collect()
    }

    pub fn is_online(&self) -> bool {
        self.with_state(|s| s.online)
    }

    /// Last successfully decoded record, if any poll has succeeded yet.
    pub fn attributes(&self) -> Option<AttributeRecord> {
        self.with_state(|s| s.attributes.clone())
    }

    /// Derived speed, or `Unavailable` while the device is unreachable.
    pub fn current_speed(&self) -> SpeedState {
        self.with_state(|s| {
            if !s.online {
                return SpeedState::Unavailable;
            }
            s.attributes
                .as_ref()
                .map_or(SpeedState::Unknown, AttributeRecord::speed)
        })
    }

    /// Power state, or `Unavailable` while unreachable or before the first
    /// successful poll.
    pub fn current_power_state(&self) -> PowerState {
        self.with_state(|s| match (&s.attributes, s.online) {
            (Some(record), true) => record.power(),
            _ => PowerState::Unavailable,
        })
    }

    /// Overrides the liveness flag.
    pub fn set_online(&self, online: bool) {
        let changed = self.with_state_mut(|s| std::mem::replace(&mut s.online, online) != online);
        if changed {
            info!(
                "Device {} is now {}",
                self.entity_id,
                if online { "reachable" } else { "unreachable" }
            );
            let _ = self.broadcast_tx.send(DeviceEvent::LivenessChanged(online));
        }
    }

    /// Runs the liveness probe and stores its verdict.
    pub async fn update(&self) {
        let online = self.probe.is_reachable().await;
        self.set_online(online);
    }

    /// Stops the background timers permanently.
    pub fn stop(&self) {
        info!("Stopping device {}", self.entity_id);
        self.cancel_token.cancel();
    }

    // -------------------------------------------------------------------------
    // Internal State Helpers
    // -------------------------------------------------------------------------

    fn with_state<R>(&self, f: impl FnOnce(&DeviceState) -> R) -> R {
        f(&self.state.read())
    }

    fn with_state_mut<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        f(&mut self.state.write())
    }
}

// -------------------------------------------------------------------------
// Device Control API
// -------------------------------------------------------------------------
impl Device {
    /// Queries the device and replaces the attribute record.
    ///
    /// Runs regardless of liveness. Returns false when the query or decoding
    /// failed, in which case the previous record is kept.
    pub async fn poll(&self) -> bool {
        let guard = self.poll_lock.lock().await;

        let record = match self.fetch_attributes().await {
            Ok(r) => r,
            Err(e) => {
                error!("Update of {} failed: {}", self.entity_id, e);
                return false;
            }
        };

        debug!("Attributes of {} refreshed", self.entity_id);
        self.with_state_mut(|s| s.attributes = Some(record.clone()));
        let _ = self
            .broadcast_tx
            .send(DeviceEvent::AttributesUpdated(record.clone()));
        // A slow bus must not hold up the next poll
        drop(guard);

        self.publisher.publish(&record).await;
        true
    }

    /// Applies an intent, then re-polls whatever the outcome of the send.
    ///
    /// Nothing is sent while the device is unreachable. Failures are logged.
    pub async fn apply_intent(&self, intent: Intent) {
        let _guard = self.intent_lock.lock().await;

        let command = translate(intent);
        debug!("{}: {:?} -> '{}'", self.entity_id, intent, command);
        if let Err(e) = self.resend.send_with_retry(&command, self.is_online()).await {
            error!(
                "{} for {} ('{}'): {}",
                get_error_message(ERR_TRANSPORT),
                self.entity_id,
                command,
                e
            );
        }

        self.poll().await;
    }

    /// Powers on, optionally selecting a speed token instead.
    pub async fn turn_on(&self, speed: Option<SpeedState>) -> Result<()> {
        let intent = match speed {
            Some(s) => Intent::from_speed(s)?,
            None => Intent::PowerOn,
        };
        self.apply_intent(intent).await;
        Ok(())
    }

    pub async fn turn_off(&self) {
        self.apply_intent(Intent::PowerOff).await;
    }

    pub async fn set_speed(&self, speed: SpeedState) -> Result<()> {
        self.apply_intent(Intent::from_speed(speed)?).await;
        Ok(())
    }

    pub async fn set_humidity(&self, target: HumidityTarget) {
        self.apply_intent(Intent::SetHumidityTarget(target)).await;
    }

    pub async fn set_function(&self, function: Function) {
        self.apply_intent(Intent::SetFunction(function)).await;
    }

    pub async fn set_light_brightness(&self, level: LightBrightness) {
        self.apply_intent(Intent::SetLightBrightness(level)).await;
    }

    pub async fn set_child_lock(&self, locked: bool) {
        self.apply_intent(Intent::SetChildLock(locked)).await;
    }

    async fn fetch_attributes(&self) -> Result<AttributeRecord> {
        let raw = self.transport.execute(&DeviceCommand::status()).await?;
        if raw.is_empty() {
            return Err(PurifierError::Transport("empty response".into()));
        }
        attributes::parse(&raw).map_err(|e| {
            debug!("{}: {}", get_error_message(ERR_PARSE), raw);
            PurifierError::from(e)
        })
    }
}

// -------------------------------------------------------------------------
// Streaming & Background Tasks
// -------------------------------------------------------------------------
impl Device {
    /// Returns a Stream of events from the device.
    pub fn stream(&self) -> impl Stream<Item = DeviceEvent> + Send + 'static {
        let mut rx = self.broadcast_tx.subscribe();
        async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        }
    }

    fn spawn_sync_tasks(&self, poll_every: Duration, probe_every: Duration) {
        debug!(
            "Starting sync tasks for {} (poll {}s, probe {}s)",
            self.entity_id,
            poll_every.as_secs(),
            probe_every.as_secs()
        );

        let device = self.clone();
        tokio::spawn(async move {
            device
                .run_timer(probe_every, |d| async move { d.update().await })
                .await
        });

        let device = self.clone();
        tokio::spawn(async move {
            device
                .run_timer(poll_every, |d| async move {
                    d.poll().await;
                })
                .await
        });
    }

    /// Calls `job` on every tick, starting immediately, until stopped.
    async fn run_timer<F, Fut>(self, period: Duration, job: F)
    where
        F: Fn(Device) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => break,
                _ = timer.tick() => job(self.clone()).await,
            }
        }
        debug!("Sync timer for {} exited", self.entity_id);
    }
}

/// Host entity id for a display name: `fan.<slug>`.
pub fn entity_id_for(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    format!("{}.{}", ENTITY_DOMAIN, slug.trim_matches('_'))
}
