use crate::command::CommandBroker;
use crate::device::DeviceRegistry;
use domain::device::DeviceProfile;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Issues periodic `read` commands to polled devices.
///
/// Responses are ingested by the telemetry listener when they arrive on the
/// response topic, so the poller only logs failures.
pub struct DevicePoller {
    broker: Arc<CommandBroker>,
    registry: Arc<DeviceRegistry>,
    cancel_token: CancellationToken,
}

impl DevicePoller {
    pub fn new(
        broker: Arc<CommandBroker>,
        registry: Arc<DeviceRegistry>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            broker,
            registry,
            cancel_token,
        }
    }

    /// Spawn one task per polled device
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let devices = self.registry.polled_devices();
        info!(count = devices.len(), "🔄 Starting device pollers");

        devices
            .into_iter()
            .map(|profile| {
                let broker = self.broker.clone();
                let cancel_token = self.cancel_token.clone();
                tokio::spawn(poll_device(broker, profile, cancel_token))
            })
            .collect()
    }
}

async fn poll_device(
    broker: Arc<CommandBroker>,
    profile: DeviceProfile,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval(Duration::from_secs(profile.polling_interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!(device_id = %profile.id, "Poller stopped");
                return;
            }
            _ = ticker.tick() => {
                match broker.dispatch(&profile.id, "read", json!({}), None).await {
                    Ok(reply) => {
                        debug!(device_id = %profile.id, latency_ms = reply.latency_ms, "Poll answered");
                    }
                    Err(e) => {
                        warn!(device_id = %profile.id, "Poll failed: {}", e);
                    }
                }
            }
        }
    }
}
