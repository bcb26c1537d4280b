use domain::device::DeviceId;
use domain::metric::MetricKey;

/// Topic layout of the listener, rooted at a configurable prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

/// Inbound topic with the device it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundTopic {
    Telemetry(DeviceId),
    Response(DeviceId),
    Status(DeviceId),
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wildcard subscriptions for everything the listener consumes
    pub fn inbound_filters(&self) -> [String; 3] {
        [
            format!("{}/telemetry/+", self.prefix),
            format!("{}/response/+", self.prefix),
            format!("{}/status/+", self.prefix),
        ]
    }

    pub fn telemetry(&self, device_id: &DeviceId) -> String {
        format!("{}/telemetry/{}", self.prefix, device_id)
    }

    pub fn response(&self, device_id: &DeviceId) -> String {
        format!("{}/response/{}", self.prefix, device_id)
    }

    pub fn command(&self, device_id: &DeviceId) -> String {
        format!("{}/cmd/{}", self.prefix, device_id)
    }

    pub fn metric(&self, key: &MetricKey) -> String {
        format!("{}/metrics/{}", self.prefix, key)
    }

    pub fn billing_closed(&self, tenant_id: &str) -> String {
        format!("{}/billing/closed/{}", self.prefix, tenant_id)
    }

    pub fn device_state(&self, device_id: &DeviceId) -> String {
        format!("{}/devices/{}/state", self.prefix, device_id)
    }

    pub fn listener_health(&self) -> String {
        format!("{}/listener/health", self.prefix)
    }

    pub fn listener_status(&self) -> String {
        format!("{}/listener/status", self.prefix)
    }

    /// Classify an inbound topic. Anything outside the layout is `None`.
    pub fn parse(&self, topic: &str) -> Option<InboundTopic> {
        let rest = topic.strip_prefix(&self.prefix)?.strip_prefix('/')?;
        let (kind, device) = rest.split_once('/')?;
        let device_id = DeviceId::new(device).ok()?;

        match kind {
            "telemetry" => Some(InboundTopic::Telemetry(device_id)),
            "response" => Some(InboundTopic::Response(device_id)),
            "status" => Some(InboundTopic::Status(device_id)),
            _ => None,
        }
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new("facility")
    }
}
