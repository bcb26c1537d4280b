use super::pending::{PendingCommand, PendingCommands, PendingInfo, Take};
use crate::device::DeviceRegistry;
use chrono::Utc;
use domain::DomainEvent;
use domain::command::{
    CommandError, CommandReply, CommandRequest, CommandResponse, CommandStatus, CorrelationId,
};
use domain::device::DeviceId;
use domain::event::EventPublisher;
use infrastructure::{MqttPublisherClient, Topics};
use rumqttc::QoS;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A response matched to the command that asked for it
#[derive(Debug, Clone)]
pub struct CompletedCommand {
    pub correlation_id: CorrelationId,
    pub device_id: DeviceId,
    pub command: String,
    pub response: CommandResponse,
}

/// Sends commands to devices and pairs their responses by correlation id.
pub struct CommandBroker {
    client: Arc<dyn MqttPublisherClient>,
    topics: Topics,
    registry: Arc<DeviceRegistry>,
    publisher: Arc<dyn EventPublisher>,
    pending: PendingCommands,
    default_timeout: Duration,
    max_pending: usize,
}

impl CommandBroker {
    pub fn new(
        client: Arc<dyn MqttPublisherClient>,
        topics: Topics,
        registry: Arc<DeviceRegistry>,
        publisher: Arc<dyn EventPublisher>,
        default_timeout: Duration,
        max_pending: usize,
    ) -> Self {
        Self {
            client,
            topics,
            registry,
            publisher,
            pending: PendingCommands::new(),
            default_timeout,
            max_pending,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Publish a command and wait for the correlated response.
    pub async fn dispatch(
        &self,
        device_id: &DeviceId,
        command: &str,
        params: Value,
        timeout: Option<Duration>,
    ) -> Result<CommandReply, CommandError> {
        let profile = self
            .registry
            .profile(device_id)
            .ok_or_else(|| CommandError::UnknownDevice(device_id.to_string()))?;
        if !profile.enabled {
            return Err(CommandError::DeviceDisabled(device_id.to_string()));
        }

        let timeout = timeout.unwrap_or(self.default_timeout);
        let correlation_id = CorrelationId::generate();
        let (tx, mut rx) = oneshot::channel();

        self.pending.try_insert(
            correlation_id.clone(),
            PendingCommand::new(device_id.clone(), command, tx),
            self.max_pending,
        )?;
        // Released on every exit, including when the caller drops this future
        let _slot = self.pending.guard(correlation_id.clone());

        let request = CommandRequest {
            correlation_id: correlation_id.clone(),
            device_id: device_id.clone(),
            command: command.to_string(),
            params,
            protocol: profile.protocol.as_str().to_string(),
            issued_at: Utc::now(),
        };

        let started = Instant::now();
        if let Err(e) = self.send(&request).await {
            warn!(device_id = %device_id, command = %command, "Failed to publish command: {}", e);
            return Err(CommandError::Publish(e.to_string()));
        }
        debug!(
            device_id = %device_id,
            command = %command,
            correlation_id = %correlation_id,
            "📤 Command sent"
        );

        let response = match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                // Sender dropped without an answer
                return Err(self.timed_out(&correlation_id, device_id, command, timeout).await);
            }
            Err(_) => {
                if self.pending.remove(&correlation_id).is_some() {
                    return Err(self.timed_out(&correlation_id, device_id, command, timeout).await);
                }
                // Completed while the deadline fired
                match rx.try_recv() {
                    Ok(response) => response,
                    Err(_) => {
                        return Err(self.timed_out(&correlation_id, device_id, command, timeout).await);
                    }
                }
            }
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        let success = response.status == CommandStatus::Ok;
        self.emit(DomainEvent::command_completed(
            correlation_id.clone(),
            device_id.clone(),
            command,
            success,
            latency_ms,
        ))
        .await;

        if !success {
            let reason = response
                .error
                .unwrap_or_else(|| "device reported an error".to_string());
            info!(device_id = %device_id, command = %command, "Command rejected: {}", reason);
            return Err(CommandError::Rejected(reason));
        }

        Ok(CommandReply {
            correlation_id,
            device_id: device_id.clone(),
            command: command.to_string(),
            data: response.data,
            latency_ms,
        })
    }

    /// Route a response received on `<prefix>/response/<device>`.
    ///
    /// Returns `None` for late or foreign responses, and for responses whose
    /// topic device differs from the target; the latter stay pending.
    pub fn complete(
        &self,
        topic_device: &DeviceId,
        response: CommandResponse,
    ) -> Option<CompletedCommand> {
        let correlation_id = response.correlation_id.clone();
        match self.pending.take_for(&correlation_id, topic_device) {
            Take::Taken(entry) => {
                let completed = CompletedCommand {
                    correlation_id,
                    device_id: entry.device_id.clone(),
                    command: entry.command.clone(),
                    response: response.clone(),
                };
                entry.resolve(response);
                Some(completed)
            }
            Take::Unknown => {
                debug!(
                    device_id = %topic_device,
                    correlation_id = %correlation_id,
                    "Dropping response with no pending command"
                );
                None
            }
            Take::DeviceMismatch { expected } => {
                warn!(
                    device_id = %topic_device,
                    expected = %expected,
                    correlation_id = %correlation_id,
                    "Response arrived on another device's topic, ignoring"
                );
                None
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending(&self) -> Vec<PendingInfo> {
        self.pending.snapshot()
    }

    async fn send(&self, request: &CommandRequest) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(request)?;
        self.client
            .publish_bytes(
                &self.topics.command(&request.device_id),
                &payload,
                QoS::AtLeastOnce,
                false,
            )
            .await
    }

    async fn timed_out(
        &self,
        correlation_id: &CorrelationId,
        device_id: &DeviceId,
        command: &str,
        timeout: Duration,
    ) -> CommandError {
        let timeout_ms = timeout.as_millis() as u64;
        warn!(
            device_id = %device_id,
            command = %command,
            correlation_id = %correlation_id,
            timeout_ms,
            "Command timed out"
        );
        self.emit(DomainEvent::command_timed_out(
            correlation_id.clone(),
            device_id.clone(),
            command,
            timeout_ms,
        ))
        .await;
        CommandError::Timeout { timeout_ms }
    }

    async fn emit(&self, event: DomainEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            warn!("Failed to publish command event: {}", e);
        }
    }
}
