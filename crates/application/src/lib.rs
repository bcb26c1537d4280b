//! Application layer - listener use cases: caching, correlation, derived metrics

pub mod cache;
pub mod command;
pub mod device;
pub mod messaging;
pub mod metrics;

pub use cache::{CacheOutcome, ReadingCache};
pub use command::{CommandBroker, CompletedCommand, PendingInfo};
pub use device::{DevicePoller, DeviceRegistry, DeviceState, DeviceView};
pub use messaging::telemetry_listener::TelemetryListener;
pub use metrics::{MetricEngine, MetricUpdate};
