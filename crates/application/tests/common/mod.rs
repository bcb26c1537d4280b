#![allow(dead_code)]

use anyhow::{Result, anyhow};
use application::{CommandBroker, DeviceRegistry, MetricEngine, ReadingCache, TelemetryListener};
use async_trait::async_trait;
use domain::command::CommandRequest;
use domain::device::{DeviceId, DeviceProfile, Protocol};
use domain::event::{EventPublisher, PublishError};
use domain::DomainEvent;
use infrastructure::config::MetricsConfig;
use infrastructure::{MqttPublisherClient, Topics};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

// --- Mock MQTT client recording every publish ---

#[derive(Clone, Default)]
pub struct MockMqttClient {
    pub published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    pub fail_publish: Arc<AtomicBool>,
}

impl MockMqttClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands published so far, decoded
    pub fn commands(&self) -> Vec<CommandRequest> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|(topic, _)| topic.contains("/cmd/"))
            .map(|(_, payload)| serde_json::from_slice(payload).unwrap())
            .collect()
    }

    /// Wait (in virtual time) until `count` commands were published
    pub async fn wait_for_commands(&self, count: usize) -> Vec<CommandRequest> {
        for _ in 0..100 {
            let commands = self.commands();
            if commands.len() >= count {
                return commands;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("expected {count} published commands");
    }
}

#[async_trait]
impl MqttPublisherClient for MockMqttClient {
    async fn publish_bytes(
        &self,
        topic: &str,
        payload: &[u8],
        _qos: rumqttc::QoS,
        _retain: bool,
    ) -> Result<()> {
        if self.fail_publish.load(Ordering::Relaxed) {
            return Err(anyhow!("Simulated Publish Failure"));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.fail_publish.load(Ordering::Relaxed)
    }
}

// --- Event publisher keeping everything it sees ---

#[derive(Clone, Default)]
pub struct RecordingPublisher {
    pub events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<DomainEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

// --- Fixtures ---

pub fn device_id(id: &str) -> DeviceId {
    DeviceId::new(id).unwrap()
}

pub fn modbus(id: &str) -> DeviceProfile {
    DeviceProfile::new(
        device_id(id),
        id.to_uppercase(),
        Protocol::Modbus {
            host: "10.0.0.10".into(),
            port: 502,
            unit_id: 1,
        },
    )
}

pub struct Harness {
    pub client: MockMqttClient,
    pub events: RecordingPublisher,
    pub cache: Arc<ReadingCache>,
    pub registry: Arc<DeviceRegistry>,
    pub engine: Arc<MetricEngine>,
    pub broker: Arc<CommandBroker>,
    pub listener: TelemetryListener,
}

impl Harness {
    pub fn new(devices: Vec<DeviceProfile>, metrics: MetricsConfig) -> Self {
        Self::with_limits(devices, metrics, Duration::from_millis(5000), 64)
    }

    pub fn with_limits(
        devices: Vec<DeviceProfile>,
        metrics: MetricsConfig,
        timeout: Duration,
        max_pending: usize,
    ) -> Self {
        let client = MockMqttClient::new();
        let events = RecordingPublisher::new();
        let publisher: Arc<dyn EventPublisher> = Arc::new(events.clone());
        let topics = Topics::new("facility");

        let cache = Arc::new(ReadingCache::new(10, Duration::from_secs(300)));
        let registry = Arc::new(DeviceRegistry::new(devices, 2, Duration::from_secs(300)));
        let engine = Arc::new(MetricEngine::new(&metrics));
        let broker = Arc::new(CommandBroker::new(
            Arc::new(client.clone()),
            topics.clone(),
            registry.clone(),
            publisher.clone(),
            timeout,
            max_pending,
        ));
        let listener = TelemetryListener::new(
            topics,
            cache.clone(),
            registry.clone(),
            engine.clone(),
            broker.clone(),
            publisher,
        );

        Self {
            client,
            events,
            cache,
            registry,
            engine,
            broker,
            listener,
        }
    }
}
