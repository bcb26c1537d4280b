use crate::cache::{CacheOutcome, ReadingCache};
use crate::command::CommandBroker;
use crate::device::DeviceRegistry;
use crate::metrics::MetricEngine;
use anyhow::Result;
use chrono::Utc;
use domain::DomainEvent;
use domain::command::{CommandResponse, CommandStatus};
use domain::device::{DeviceId, DeviceStatus};
use domain::event::EventPublisher;
use domain::reading::{Reading, ReadingSource};
use infrastructure::{InboundTopic, MqttClient, Topics};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Consumes device traffic from the broker: telemetry, command responses
/// and status announcements.
pub struct TelemetryListener {
    topics: Topics,
    cache: Arc<ReadingCache>,
    registry: Arc<DeviceRegistry>,
    engine: Arc<MetricEngine>,
    broker: Arc<CommandBroker>,
    publisher: Arc<dyn EventPublisher>,
}

impl TelemetryListener {
    pub fn new(
        topics: Topics,
        cache: Arc<ReadingCache>,
        registry: Arc<DeviceRegistry>,
        engine: Arc<MetricEngine>,
        broker: Arc<CommandBroker>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            topics,
            cache,
            registry,
            engine,
            broker,
            publisher,
        }
    }

    /// Subscribe to device traffic and process it until the client goes away.
    pub async fn run(&self, mqtt_client: MqttClient) -> Result<()> {
        let mut rx = mqtt_client.subscribe_messages();
        for filter in self.topics.inbound_filters() {
            mqtt_client.subscribe(&filter).await?;
            info!(topic = %filter, "Subscribed");
        }

        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if let Err(e) = self.handle_message(&msg.topic, &msg.payload).await {
                        error!(topic = %msg.topic, "Failed to handle message: {}", e);
                    }
                    // Bad payloads are acked too: redelivery cannot fix them
                    if let Err(e) = mqtt_client.ack(&msg.topic, msg.pkid).await {
                        warn!(topic = %msg.topic, "Failed to ack message: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(skipped = count, "Telemetry listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    warn!("MQTT message channel closed");
                    return Ok(());
                }
            }
        }
    }

    /// Route one inbound message by topic.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let Some(inbound) = self.topics.parse(topic) else {
            debug!(topic = %topic, "Ignoring message outside the device topics");
            return Ok(());
        };

        match inbound {
            InboundTopic::Telemetry(device_id) => {
                let value: serde_json::Value = match serde_json::from_slice(payload) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(device_id = %device_id, "Telemetry is not valid JSON: {}", e);
                        return Ok(());
                    }
                };
                match Reading::from_payload(device_id, value, Utc::now(), ReadingSource::Telemetry)
                {
                    Ok(reading) => {
                        self.ingest(reading).await;
                    }
                    Err(e) => warn!("Rejected telemetry: {}", e),
                }
            }
            InboundTopic::Response(device_id) => {
                let response: CommandResponse = match serde_json::from_slice(payload) {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(device_id = %device_id, "Malformed command response: {}", e);
                        return Ok(());
                    }
                };
                self.handle_response(device_id, response).await;
            }
            InboundTopic::Status(device_id) => {
                let status = DeviceStatus::from_payload(payload);
                if let Some(event) = self.registry.apply_status(&device_id, status, Utc::now()) {
                    self.emit(vec![event]).await;
                }
            }
        }

        Ok(())
    }

    /// Cache a reading and propagate it to the metrics that depend on it.
    pub async fn ingest(&self, reading: Reading) -> CacheOutcome {
        let now = Utc::now();
        let device_id = reading.device_id.clone();

        if self.cache.upsert(reading.clone()) == CacheOutcome::Rejected {
            debug!(
                device_id = %device_id,
                measured_at = %reading.measured_at,
                "Dropping out-of-order reading"
            );
            return CacheOutcome::Rejected;
        }

        let mut events = Vec::new();
        if let Some(event) = self.registry.mark_seen(&device_id, now) {
            events.push(event);
        }
        events.push(DomainEvent::reading_received(reading));

        let update = self.engine.on_reading(&device_id, &self.cache, now);
        events.extend(
            update
                .closed
                .into_iter()
                .map(DomainEvent::billing_period_closed),
        );
        events.extend(update.samples.into_iter().map(DomainEvent::metric_computed));

        self.emit(events).await;
        CacheOutcome::Accepted
    }

    async fn handle_response(&self, device_id: DeviceId, response: CommandResponse) {
        let Some(completed) = self.broker.complete(&device_id, response) else {
            return;
        };

        if completed.command != "read" || completed.response.status != CommandStatus::Ok {
            return;
        }
        if !completed.response.data.is_object() {
            debug!(device_id = %completed.device_id, "Read response carries no reading");
            return;
        }

        match Reading::from_payload(
            completed.device_id,
            completed.response.data,
            Utc::now(),
            ReadingSource::PollResponse,
        ) {
            Ok(reading) => {
                self.ingest(reading).await;
            }
            Err(e) => warn!("Rejected poll response: {}", e),
        }
    }

    async fn emit(&self, events: Vec<DomainEvent>) {
        if let Err(e) = self.publisher.publish_all(events).await {
            warn!("Failed to publish listener events: {}", e);
        }
    }
}
