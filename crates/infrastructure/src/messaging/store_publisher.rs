use async_trait::async_trait;
use domain::DomainEvent;
use domain::event::{EventPublisher, PublishError};
use domain::metric::MetricValue;
use domain::store::TelemetryStore;
use std::sync::Arc;

/// Persists readings, metric history and billing statements
pub struct StoreEventPublisher {
    store: Arc<dyn TelemetryStore>,
}

impl StoreEventPublisher {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventPublisher for StoreEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        match event {
            DomainEvent::ReadingReceived { reading } => {
                self.store.save_reading(&reading).await?;
            }
            DomainEvent::MetricComputed { sample } => {
                self.store.save_metric(&sample).await?;
                if let MetricValue::Billing(statement) = &sample.value {
                    self.store.save_billing(statement).await?;
                }
            }
            DomainEvent::BillingPeriodClosed { statement, .. } => {
                self.store.save_billing(&statement).await?;
                tracing::info!(
                    tenant_id = %statement.tenant_id,
                    period = %statement.period,
                    cost = statement.cost,
                    "💾 Billing period closed and saved"
                );
            }
            _ => {}
        }
        Ok(())
    }
}
