use crate::DomainEvent;
use async_trait::async_trait;

pub type PublishError = Box<dyn std::error::Error + Send + Sync>;

/// Sink for domain events (broker, store, live dashboards).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: DomainEvent) -> Result<(), PublishError>;

    /// Publish events in order, stopping at the first failure
    async fn publish_all(&self, events: Vec<DomainEvent>) -> Result<(), PublishError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
