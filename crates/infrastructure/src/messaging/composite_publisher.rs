use async_trait::async_trait;
use domain::DomainEvent;
use domain::event::{EventPublisher, PublishError};
use std::sync::Arc;

/// Fans every event out to all publishers. A failing sink is logged and
/// never starves the others.
pub struct CompositeEventPublisher {
    publishers: Vec<Arc<dyn EventPublisher>>,
}

impl CompositeEventPublisher {
    pub fn new(publishers: Vec<Arc<dyn EventPublisher>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl EventPublisher for CompositeEventPublisher {
    async fn publish(&self, event: DomainEvent) -> Result<(), PublishError> {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(event.clone()).await {
                tracing::error!(
                    event_type = %event.event_type(),
                    "Failed to publish event to one of the publishers: {}",
                    e
                );
            }
        }
        Ok(())
    }
}
