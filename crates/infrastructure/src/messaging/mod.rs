pub mod buffered_publisher;
pub mod composite_publisher;
pub mod mqtt_client;
pub mod store_publisher;
pub mod topics;

pub use composite_publisher::CompositeEventPublisher;
