//! Infrastructure layer - External integrations

pub mod config;
pub mod database;
pub mod messaging;

pub use database::{SQLiteBuffer, SeaOrmDeviceRepository, SeaOrmTelemetryStore};
pub use messaging::buffered_publisher::BufferedMqttPublisher;
pub use messaging::composite_publisher::CompositeEventPublisher;
pub use messaging::mqtt_client::{MqttClient, MqttMessage, MqttPublisherClient};
pub use messaging::store_publisher::StoreEventPublisher;
pub use messaging::topics::{InboundTopic, Topics};
