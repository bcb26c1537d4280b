use crate::database::SQLiteBuffer;
use crate::messaging::mqtt_client::MqttPublisherClient;
use crate::messaging::topics::Topics;
use async_trait::async_trait;
use domain::DomainEvent;
use domain::event::{EventPublisher, PublishError};
use rumqttc::QoS;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How an outbound event is delivered
struct Outbound {
    topic: String,
    payload: Vec<u8>,
    qos: QoS,
    retain: bool,
    /// Queue in the offline buffer when the broker is unreachable
    durable: bool,
}

/// Publishes derived data to the broker, buffering durable messages in
/// SQLite while the broker is unreachable.
#[derive(Clone)]
pub struct BufferedMqttPublisher {
    client: Arc<dyn MqttPublisherClient>,
    buffer: SQLiteBuffer,
    topics: Topics,
}

impl BufferedMqttPublisher {
    pub fn new(client: Arc<dyn MqttPublisherClient>, buffer: SQLiteBuffer, topics: Topics) -> Self {
        Self::with_flush_interval(client, buffer, topics, Duration::from_secs(5))
    }

    pub fn with_flush_interval(
        client: Arc<dyn MqttPublisherClient>,
        buffer: SQLiteBuffer,
        topics: Topics,
        flush_interval: Duration,
    ) -> Self {
        let publisher = Self {
            client,
            buffer,
            topics,
        };
        publisher.start_flusher(flush_interval);
        publisher
    }

    fn start_flusher(&self, flush_interval: Duration) {
        let client = self.client.clone();
        let buffer = self.buffer.clone();

        tokio::spawn(async move {
            info!("🔄 Starting buffer flusher...");
            loop {
                tokio::time::sleep(flush_interval).await;

                if !client.is_connected() {
                    continue;
                }

                match buffer.count().await {
                    Ok(count) if count > 0 => match buffer.dequeue_batch(50).await {
                        Ok(rows) => {
                            info!("📤 Flushing {} buffered messages...", rows.len());
                            for row in rows {
                                match client
                                    .publish_bytes(
                                        &row.topic,
                                        &row.payload,
                                        QoS::AtLeastOnce,
                                        row.retain,
                                    )
                                    .await
                                {
                                    Ok(_) => {
                                        if let Err(e) = buffer.delete(row.id).await {
                                            error!(
                                                "Failed to delete forwarded message {}: {}",
                                                row.id, e
                                            );
                                        }
                                    }
                                    Err(e) => {
                                        warn!("Flusher paused: MQTT publish failed: {}", e);
                                        break;
                                    }
                                }
                            }
                        }
                        Err(e) => error!("Failed to dequeue batch: {}", e),
                    },
                    Ok(_) => {}
                    Err(e) => error!("Failed to check buffer count: {}", e),
                }
            }
        });
    }

    fn outbound(&self, event: &DomainEvent) -> Result<Option<Outbound>, serde_json::Error> {
        let outbound = match event {
            DomainEvent::MetricComputed { sample } => Some(Outbound {
                topic: self.topics.metric(&sample.key),
                payload: serde_json::to_vec(sample)?,
                qos: QoS::AtLeastOnce,
                retain: true,
                durable: true,
            }),
            DomainEvent::BillingPeriodClosed { statement, .. } => Some(Outbound {
                topic: self.topics.billing_closed(&statement.tenant_id),
                payload: serde_json::to_vec(statement)?,
                qos: QoS::AtLeastOnce,
                retain: false,
                durable: true,
            }),
            DomainEvent::DeviceStatusChanged {
                device_id,
                new_status,
                reason,
                timestamp,
                ..
            } => Some(Outbound {
                topic: self.topics.device_state(device_id),
                payload: json!({
                    "status": new_status.as_str(),
                    "reason": reason,
                    "ts": timestamp.timestamp_millis()
                })
                .to_string()
                .into_bytes(),
                qos: QoS::AtLeastOnce,
                retain: true,
                durable: false,
            }),
            // Heartbeats are ephemeral: never replay them after an outage
            DomainEvent::ListenerHeartbeat {
                uptime_secs,
                devices_online,
                cached_devices,
                pending_commands,
                timestamp,
                ..
            } => Some(Outbound {
                topic: self.topics.listener_health(),
                payload: json!({
                    "uptime": uptime_secs,
                    "devices_online": devices_online,
                    "cached_devices": cached_devices,
                    "pending_commands": pending_commands,
                    "ts": timestamp.timestamp_millis()
                })
                .to_string()
                .into_bytes(),
                qos: QoS::AtMostOnce,
                retain: false,
                durable: false,
            }),
            _ => None,
        };
        Ok(outbound)
    }
}

#[async_trait]
impl EventPublisher for BufferedMqttPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        let Some(out) = self.outbound(&event)? else {
            return Ok(());
        };

        if !out.durable {
            if let Err(e) = self
                .client
                .publish_bytes(&out.topic, &out.payload, out.qos, out.retain)
                .await
            {
                warn!(topic = %out.topic, "Best-effort publish failed: {}", e);
            }
            return Ok(());
        }

        if !self.client.is_connected() {
            warn!(topic = %out.topic, "MQTT Client offline. Buffering message...");
            self.buffer
                .enqueue(&out.topic, &out.payload, out.retain)
                .await?;
            return Ok(());
        }

        // Replay is in insertion order, so a live publish would be overwritten
        // on retained topics by an older buffered value
        if self.buffer.count().await? > 0 {
            debug!(topic = %out.topic, "Buffer not drained yet. Queueing behind it...");
            self.buffer
                .enqueue(&out.topic, &out.payload, out.retain)
                .await?;
            return Ok(());
        }

        if let Err(e) = self
            .client
            .publish_bytes(&out.topic, &out.payload, out.qos, out.retain)
            .await
        {
            warn!("MQTT publish failed ({}). Buffering message...", e);
            self.buffer
                .enqueue(&out.topic, &out.payload, out.retain)
                .await?;
        }
        Ok(())
    }
}
