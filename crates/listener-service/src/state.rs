use application::{CommandBroker, DeviceRegistry, MetricEngine, ReadingCache};
use async_trait::async_trait;
use domain::DomainEvent;
use domain::event::{EventPublisher, PublishError};
use domain::rack::RackLayout;
use infrastructure::{MqttPublisherClient, SeaOrmTelemetryStore};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;

/// Shared handles behind the HTTP API
pub struct AppState {
    pub listener_id: String,
    pub cache: Arc<ReadingCache>,
    pub registry: Arc<DeviceRegistry>,
    pub engine: Arc<MetricEngine>,
    pub broker: Arc<CommandBroker>,
    pub racks: RackLayout,
    pub mqtt: Arc<dyn MqttPublisherClient>,
    /// Closed billing periods; absent when running without a database
    pub store: Option<Arc<SeaOrmTelemetryStore>>,
    pub tx: broadcast::Sender<DomainEvent>,
    pub started_at: Instant,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        listener_id: impl Into<String>,
        cache: Arc<ReadingCache>,
        registry: Arc<DeviceRegistry>,
        engine: Arc<MetricEngine>,
        broker: Arc<CommandBroker>,
        racks: RackLayout,
        mqtt: Arc<dyn MqttPublisherClient>,
        tx: broadcast::Sender<DomainEvent>,
    ) -> Self {
        Self {
            listener_id: listener_id.into(),
            cache,
            registry,
            engine,
            broker,
            racks,
            mqtt,
            store: None,
            tx,
            started_at: Instant::now(),
        }
    }

    pub fn with_store(mut self, store: Arc<SeaOrmTelemetryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn heartbeat(&self) -> DomainEvent {
        DomainEvent::listener_heartbeat(
            &self.listener_id,
            self.uptime_secs(),
            self.registry.online_count(),
            self.cache.len(),
            self.broker.pending_count(),
        )
    }
}

/// Forwards domain events to SSE subscribers
pub struct BroadcastEventPublisher {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(tx: broadcast::Sender<DomainEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        // No dashboard connected is the normal case
        let _ = self.tx.send(event);
        Ok(())
    }
}
