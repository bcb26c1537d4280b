use crate::DomainError;
use crate::metric::{BillingStatement, MetricSample};
use crate::reading::Reading;
use async_trait::async_trait;

/// Durable side of the listener: last readings, metric history, billing.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Upsert the last known reading of a device
    async fn save_reading(&self, reading: &Reading) -> Result<(), DomainError>;

    /// Last known reading of every device, used to warm the cache
    async fn load_readings(&self) -> Result<Vec<Reading>, DomainError>;

    /// Append a metric sample to the history
    async fn save_metric(&self, sample: &MetricSample) -> Result<(), DomainError>;

    /// Upsert a billing statement keyed by tenant and period
    async fn save_billing(&self, statement: &BillingStatement) -> Result<(), DomainError>;

    /// Statements of periods not yet closed, latest period first
    async fn load_open_billing(&self) -> Result<Vec<BillingStatement>, DomainError>;
}
