mod common;

use application::{CommandBroker, DeviceRegistry, MetricEngine, ReadingCache, TelemetryListener};
use async_trait::async_trait;
use common::{MockMqttClient, RecordingPublisher, device_id, modbus};
use domain::DomainError;
use domain::event::EventPublisher;
use domain::metric::{BillingStatement, MeterRef, MetricKey, MetricSample, PueDefinition};
use domain::reading::Reading;
use domain::store::TelemetryStore;
use infrastructure::config::MetricsConfig;
use infrastructure::{CompositeEventPublisher, StoreEventPublisher, Topics};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Store {}

    #[async_trait]
    impl TelemetryStore for Store {
        async fn save_reading(&self, reading: &Reading) -> Result<(), DomainError>;
        async fn load_readings(&self) -> Result<Vec<Reading>, DomainError>;
        async fn save_metric(&self, sample: &MetricSample) -> Result<(), DomainError>;
        async fn save_billing(&self, statement: &BillingStatement) -> Result<(), DomainError>;
        async fn load_open_billing(&self) -> Result<Vec<BillingStatement>, DomainError>;
    }
}

fn listener_with_store(store: MockStore, recorder: RecordingPublisher) -> (TelemetryListener, Arc<MetricEngine>) {
    let store_sink: Arc<dyn EventPublisher> = Arc::new(StoreEventPublisher::new(Arc::new(store)));
    let recorder_sink: Arc<dyn EventPublisher> = Arc::new(recorder);
    let publisher: Arc<dyn EventPublisher> =
        Arc::new(CompositeEventPublisher::new(vec![store_sink, recorder_sink]));

    let metrics = MetricsConfig {
        pue: vec![PueDefinition {
            site: "dc1".into(),
            facility_meters: vec![MeterRef::new(device_id("main"), "kw")],
            it_meters: vec![MeterRef::new(device_id("it"), "kw")],
        }],
        ..Default::default()
    };

    let topics = Topics::new("facility");
    let cache = Arc::new(ReadingCache::new(10, Duration::from_secs(300)));
    let registry = Arc::new(DeviceRegistry::new(
        vec![modbus("main"), modbus("it")],
        2,
        Duration::from_secs(300),
    ));
    let engine = Arc::new(MetricEngine::new(&metrics));
    let broker = Arc::new(CommandBroker::new(
        Arc::new(MockMqttClient::new()),
        topics.clone(),
        registry.clone(),
        publisher.clone(),
        Duration::from_secs(5),
        64,
    ));

    (
        TelemetryListener::new(topics, cache, registry, engine.clone(), broker, publisher),
        engine,
    )
}

#[tokio::test]
async fn test_store_failure_does_not_block_metrics() {
    let mut store = MockStore::new();
    store
        .expect_save_reading()
        .times(2)
        .returning(|_| Err(DomainError::Storage("disk full".into())));
    store
        .expect_save_metric()
        .times(1)
        .returning(|_| Err(DomainError::Storage("disk full".into())));

    let recorder = RecordingPublisher::new();
    let (listener, engine) = listener_with_store(store, recorder.clone());

    for (device, kw) in [("main", 130.0), ("it", 100.0)] {
        listener
            .handle_message(
                &format!("facility/telemetry/{device}"),
                json!({"kw": kw}).to_string().as_bytes(),
            )
            .await
            .unwrap();
    }

    assert!(engine.sample(&MetricKey::Pue("dc1".into())).is_some());
    assert_eq!(recorder.of_type("MetricComputed").len(), 1);
    assert_eq!(recorder.of_type("ReadingReceived").len(), 2);
}

#[tokio::test]
async fn test_readings_and_metrics_are_persisted() {
    let mut store = MockStore::new();
    store
        .expect_save_reading()
        .withf(|r: &Reading| r.number("kw").is_some())
        .times(2)
        .returning(|_| Ok(()));
    store
        .expect_save_metric()
        .withf(|s: &MetricSample| s.key == MetricKey::Pue("dc1".into()))
        .times(1)
        .returning(|_| Ok(()));
    store.expect_save_billing().never();

    let (listener, _engine) = listener_with_store(store, RecordingPublisher::new());

    for (device, kw) in [("main", 130.0), ("it", 100.0)] {
        listener
            .handle_message(
                &format!("facility/telemetry/{device}"),
                json!({"kw": kw}).to_string().as_bytes(),
            )
            .await
            .unwrap();
    }
}
