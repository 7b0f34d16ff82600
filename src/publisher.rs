//! Mirrors attribute records onto a publish/subscribe bus.
//!
//! One bus connection may serve many devices. The device identity is only
//! used to build the topic; the publisher keeps no per-device state.

use crate::attributes::AttributeRecord;
use crate::error::{PurifierError, Result};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::sync::Arc;
use tokio::time::{Duration, sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Topic namespace shared by every device.
pub const TOPIC_PREFIX: &str = "philips-air-purifier-coap";

const ATTRIBUTES_SUFFIX: &str = "attributes";
const KEEP_ALIVE: Duration = Duration::from_secs(60);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REQUEST_CAPACITY: usize = 10;

/// Upper bound on a single bus hand-off before the record is dropped.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fire-and-forget message sink.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<()>;
}

pub fn attributes_topic(device_id: &str) -> String {
    format!("{}/{}/{}", TOPIC_PREFIX, device_id, ATTRIBUTES_SUFFIX)
}

/// MQTT connection driven by a background event loop task.
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    cancel_token: CancellationToken,
}

impl MqttBus {
    /// Connects to `host:port`. Must be called from within a tokio runtime.
    pub fn connect(client_id: &str, host: &str, port: u16) -> Self {
        info!("Connecting to MQTT broker at {}:{}", host, port);
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(KEEP_ALIVE);
        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let broker = format!("{}:{}", host, port);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = eventloop.poll() => {
                        if let Err(e) = event {
                            warn!("MQTT connection to {} lost: {}", broker, e);
                            sleep(RECONNECT_DELAY).await;
                        }
                    }
                }
            }
            debug!("MQTT event loop for {} stopped", broker);
        });

        Self {
            client,
            cancel_token,
        }
    }

    pub fn stop(&self) {
        self.cancel_token.cancel();
    }
}

#[async_trait]
impl Bus for MqttBus {
    /// Queues the message without waiting; fails when the request queue is
    /// full, e.g. while the broker is unreachable.
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(|e| PurifierError::Publish(e.to_string()))
    }
}

/// Forwards full attribute records to the bus, keyed by device identity.
#[derive(Clone, Default)]
pub struct StatePublisher {
    bus: Option<Arc<dyn Bus>>,
}

impl StatePublisher {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus: Some(bus) }
    }

    /// A publisher that drops every record.
    pub fn disabled() -> Self {
        Self { bus: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.bus.is_some()
    }

    /// Publishes `record`. Skipped when no bus is configured or the record has
    /// no device identity. Bus failures and hand-offs slower than
    /// [`PUBLISH_TIMEOUT`] are logged and not retried.
    pub async fn publish(&self, record: &AttributeRecord) {
        let Some(bus) = &self.bus else {
            return;
        };
        let Some(device_id) = record.device_id() else {
            debug!("Record has no device_id, not publishing");
            return;
        };

        let payload = match record.to_json() {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize attributes for {}: {}", device_id, e);
                return;
            }
        };

        let topic = attributes_topic(device_id);
        match timeout(PUBLISH_TIMEOUT, bus.publish(&topic, payload)).await {
            Ok(Ok(())) => debug!("Published attributes to {}", topic),
            Ok(Err(e)) => error!("Failed to publish to {}: {}", topic, e),
            Err(_) => error!("Publishing to {} timed out", topic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::parse;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Bus for Recorder {
        async fn publish(&self, topic: &str, payload: String) -> Result<()> {
            self.messages.lock().push((topic.to_string(), payload));
            Ok(())
        }
    }

    /// Never completes a hand-off.
    struct Stuck;

    #[async_trait]
    impl Bus for Stuck {
        async fn publish(&self, _topic: &str, _payload: String) -> Result<()> {
            std::future::pending().await
        }
    }

    fn record(device_id: &str) -> AttributeRecord {
        let mut lines: Vec<String> = (0..32).map(|i| format!("[l{i}] Line: v{i}")).collect();
        lines[31] = format!("[DeviceId] DeviceId: {device_id}");
        parse(&lines.join("\n")).unwrap()
    }

    #[test]
    fn topic_layout() {
        assert_eq!(
            attributes_topic("abc"),
            "philips-air-purifier-coap/abc/attributes"
        );
    }

    #[tokio::test]
    async fn publishes_full_record() {
        let bus = Arc::new(Recorder::default());
        let publisher = StatePublisher::new(bus.clone());

        publisher.publish(&record("abc")).await;

        let messages = bus.messages.lock();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "philips-air-purifier-coap/abc/attributes");
        let payload: serde_json::Value = serde_json::from_str(&messages[0].1).unwrap();
        assert_eq!(payload["device_id"], "abc");
        assert_eq!(payload["fan_speed"], "v4");
    }

    #[tokio::test]
    async fn skips_record_without_identity() {
        let bus = Arc::new(Recorder::default());
        let publisher = StatePublisher::new(bus.clone());

        publisher.publish(&record("")).await;

        assert!(bus.messages.lock().is_empty());
    }

    #[tokio::test]
    async fn disabled_publisher_is_a_no_op() {
        let publisher = StatePublisher::disabled();
        assert!(!publisher.is_enabled());
        publisher.publish(&record("abc")).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_bus_is_abandoned() {
        let publisher = StatePublisher::new(Arc::new(Stuck));
        let start = tokio::time::Instant::now();

        publisher.publish(&record("abc")).await;

        assert_eq!(start.elapsed(), PUBLISH_TIMEOUT);
    }

    #[tokio::test]
    async fn full_request_queue_fails_without_blocking() {
        // Nothing listens on port 1, so the event loop never drains the queue
        let bus = MqttBus::connect("philair-test", "127.0.0.1", 1);
        let mut failed = false;
        for _ in 0..=REQUEST_CAPACITY {
            if bus.publish("philair/test", "x".to_string()).await.is_err() {
                failed = true;
                break;
            }
        }
        assert!(failed);
        bus.stop();
    }
}
