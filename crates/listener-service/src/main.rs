use anyhow::Result;
use application::{
    CommandBroker, DevicePoller, DeviceRegistry, MetricEngine, ReadingCache, TelemetryListener,
};
use clap::Parser;
use domain::DomainEvent;
use domain::device::DeviceRepository;
use domain::event::EventPublisher;
use domain::rack::RackLayout;
use domain::store::TelemetryStore;
use infrastructure::config::ListenerConfig;
use infrastructure::database::connect_and_migrate;
use infrastructure::messaging::mqtt_client::BirthMessage;
use infrastructure::{
    BufferedMqttPublisher, CompositeEventPublisher, MqttClient, MqttPublisherClient,
    SQLiteBuffer, SeaOrmDeviceRepository, SeaOrmTelemetryStore, StoreEventPublisher, Topics,
};
use rumqttc::{LastWill, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use listener_service::state::{AppState, BroadcastEventPublisher};
use listener_service::{api, tasks};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding default.toml and per-environment overrides
    #[arg(long, default_value = "config")]
    config_dir: String,

    /// MQTT Broker Host
    #[arg(long)]
    mqtt_host: Option<String>,

    /// MQTT Broker Port
    #[arg(long)]
    mqtt_port: Option<u16>,

    /// API Port
    #[arg(long)]
    api_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,listener_service=debug,application=debug")
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("🏢 Facility Listener Starting...");

    // 0. Load configuration
    let mut config = ListenerConfig::load(&args.config_dir)?;
    if let Some(host) = args.mqtt_host {
        config.mqtt.host = host;
    }
    if let Some(port) = args.mqtt_port {
        config.mqtt.port = port;
    }
    if let Some(port) = args.api_port {
        config.api_port = port;
    }
    config.validate()?;
    info!(
        listener_id = %config.listener_id,
        devices = config.devices.len(),
        "✅ Configuration loaded"
    );

    let topics = Topics::new(config.mqtt.topic_prefix.clone());

    // 1. Database
    info!("Connecting to database...");
    let db = connect_and_migrate(&config.database_url).await?;
    info!("✅ Migrations applied successfully");

    let device_repo = SeaOrmDeviceRepository::new(db.clone());
    let store = Arc::new(SeaOrmTelemetryStore::new(db));

    let stored = device_repo.find_all().await.unwrap_or_else(|e| {
        warn!("Failed to load stored devices: {}", e);
        Vec::new()
    });
    for profile in &config.devices {
        if let Err(e) = device_repo.save(profile).await {
            warn!(device_id = %profile.id, "Failed to persist device profile: {}", e);
        }
    }
    let profiles = DeviceRegistry::merge_profiles(stored, config.devices.clone());
    let racks = RackLayout::build(&config.racks, &profiles)?;

    // 1.5 Local buffer (store & forward)
    let buffer = SQLiteBuffer::new(&config.buffer_path).await?;
    info!("✅ Local Buffer Initialized at {}", config.buffer_path);

    // 2. MQTT
    let status_topic = topics.listener_status();
    let offline_payload = serde_json::json!({ "status": "OFFLINE" }).to_string();
    let last_will = LastWill::new(
        &status_topic,
        offline_payload.clone(),
        QoS::AtLeastOnce,
        true,
    );
    let birth = BirthMessage {
        topic: status_topic.clone(),
        payload: serde_json::json!({ "status": "ONLINE" }).to_string(),
    };

    let client_id = config.client_id();
    info!(host = %config.mqtt.host, port = %config.mqtt.port, client_id = %client_id, "Connecting to MQTT...");
    let mqtt_client = MqttClient::new(
        &config.mqtt.host,
        config.mqtt.port,
        &client_id,
        Some(last_will),
        Some(birth),
    )
    .await?;
    let mqtt_publisher: Arc<dyn MqttPublisherClient> = Arc::new(mqtt_client.clone());

    // 3. Event fan-out: broker (buffered), store, dashboards
    let (events_tx, _) = broadcast::channel(256);
    let telemetry_store: Arc<dyn TelemetryStore> = store.clone();
    let broker_sink: Arc<dyn EventPublisher> = Arc::new(BufferedMqttPublisher::new(
        mqtt_publisher.clone(),
        buffer,
        topics.clone(),
    ));
    let store_sink: Arc<dyn EventPublisher> =
        Arc::new(StoreEventPublisher::new(telemetry_store.clone()));
    let dashboard_sink: Arc<dyn EventPublisher> =
        Arc::new(BroadcastEventPublisher::new(events_tx.clone()));
    let publisher: Arc<dyn EventPublisher> = Arc::new(CompositeEventPublisher::new(vec![
        broker_sink,
        store_sink,
        dashboard_sink,
    ]));

    // 4. Cache, registry, metrics
    let cache = Arc::new(ReadingCache::new(
        config.cache.history_depth,
        config.stale_after(),
    ));
    match telemetry_store.load_readings().await {
        Ok(readings) => info!(devices = cache.warm(readings), "✅ Cache warmed from store"),
        Err(e) => warn!("Failed to warm cache: {}", e),
    }

    let registry = Arc::new(DeviceRegistry::new(
        profiles,
        config.liveness.missed_threshold,
        config.stale_after(),
    ));
    let engine = Arc::new(MetricEngine::new(&config.metrics));
    let open_billing = telemetry_store.load_open_billing().await.unwrap_or_else(|e| {
        warn!("Failed to load open billing periods: {}", e);
        Vec::new()
    });
    let closed_at_startup = engine.prime(&cache, &open_billing);

    let broker = Arc::new(CommandBroker::new(
        mqtt_publisher.clone(),
        topics.clone(),
        registry.clone(),
        publisher.clone(),
        config.commands.timeout(),
        config.commands.max_pending,
    ));

    // 5. Listener
    let listener = Arc::new(TelemetryListener::new(
        topics.clone(),
        cache.clone(),
        registry.clone(),
        engine.clone(),
        broker.clone(),
        publisher.clone(),
    ));
    for statement in closed_at_startup {
        if let Err(e) = publisher
            .publish(DomainEvent::billing_period_closed(statement))
            .await
        {
            warn!("Failed to publish closed billing period: {}", e);
        }
    }

    let listener_client = mqtt_client.clone();
    tokio::spawn(async move {
        if let Err(e) = listener.run(listener_client).await {
            error!("Telemetry listener stopped: {}", e);
        }
    });

    let state = Arc::new(
        AppState::new(
            config.listener_id.clone(),
            cache,
            registry.clone(),
            engine,
            broker.clone(),
            racks,
            mqtt_publisher,
            events_tx,
        )
        .with_store(store),
    );

    // 6. Background loops
    let cancel_token = CancellationToken::new();
    tasks::spawn_liveness_loop(
        registry.clone(),
        publisher.clone(),
        Duration::from_secs(config.liveness.check_interval_secs),
        cancel_token.clone(),
    );
    tasks::spawn_heartbeat_loop(
        state.clone(),
        publisher,
        Duration::from_secs(config.heartbeat_interval_secs),
        cancel_token.clone(),
    );
    DevicePoller::new(broker, registry, cancel_token.clone()).start();

    // 7. API
    let app = api::create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    info!("🚀 API Listening on http://{}", addr);

    let tcp = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(tcp, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 8. Shutdown
    cancel_token.cancel();
    // Publish OFFLINE before exit (Best effort)
    let _ = mqtt_client.publish(&status_topic, &offline_payload, true).await;
    if let Err(e) = mqtt_client.disconnect().await {
        warn!("Failed to disconnect cleanly: {}", e);
    }

    info!("👋 Good bye!");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Shutting down..."),
        Err(err) => warn!(error = %err, "Unable to listen for shutdown signal"),
    }
}
