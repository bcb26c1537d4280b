//! Periodic loops that run next to the telemetry listener.

use crate::state::AppState;
use application::DeviceRegistry;
use chrono::Utc;
use domain::event::EventPublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Declare silent devices offline.
pub fn spawn_liveness_loop(
    registry: Arc<DeviceRegistry>,
    publisher: Arc<dyn EventPublisher>,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "🩺 Liveness monitor started");

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Liveness monitor stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let events = registry.check_liveness(Utc::now());
                    if events.is_empty() {
                        continue;
                    }
                    if let Err(e) = publisher.publish_all(events).await {
                        warn!("Failed to publish liveness events: {}", e);
                    }
                }
            }
        }
    })
}

/// Report listener health on the broker.
pub fn spawn_heartbeat_loop(
    state: Arc<AppState>,
    publisher: Arc<dyn EventPublisher>,
    period: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("Heartbeat stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = publisher.publish(state.heartbeat()).await {
                        warn!(error = %e, "Failed to publish heartbeat");
                    } else {
                        debug!("💓 Heartbeat sent");
                    }
                }
            }
        }
    })
}
