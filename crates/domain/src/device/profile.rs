use super::protocol::is_valid_eui;
use super::{DeviceId, Protocol};
use crate::error::{DomainError, Result};
use crate::rack::RackPlacement;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named template describing how the listener talks to a physical device.
///
/// The profile carries the communication parameters (`protocol`), how often
/// the device should be polled and, optionally, where it sits in a rack and
/// which tenant it is billed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: DeviceId,
    pub name: String,
    pub protocol: Protocol,
    /// Seconds between `read` polls. 0 means telemetry-only.
    #[serde(default)]
    pub polling_interval_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub placement: Option<RackPlacement>,
}

fn default_enabled() -> bool {
    true
}

impl DeviceProfile {
    pub fn new(id: DeviceId, name: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            id,
            name: name.into(),
            protocol,
            polling_interval_secs: 0,
            enabled: true,
            tenant_id: None,
            placement: None,
        }
    }

    pub fn with_polling_interval(mut self, secs: u64) -> Self {
        self.polling_interval_secs = secs;
        self
    }

    pub fn with_placement(mut self, placement: RackPlacement) -> Self {
        self.placement = Some(placement);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::InvalidConfiguration(format!(
                "Device {} has an empty name",
                self.id
            )));
        }

        if let Protocol::Lorawan { dev_eui, app_eui } = &self.protocol {
            if !is_valid_eui(dev_eui) || !is_valid_eui(app_eui) {
                return Err(DomainError::InvalidConfiguration(format!(
                    "Device {} has an invalid LoRaWAN EUI",
                    self.id
                )));
            }
        }

        if let Some(placement) = &self.placement {
            if placement.size_u == 0 {
                return Err(DomainError::InvalidConfiguration(format!(
                    "Device {} has a zero-sized rack placement",
                    self.id
                )));
            }
        }

        Ok(())
    }

    pub fn is_polled(&self) -> bool {
        self.polling_interval_secs > 0
    }

    /// Silence after which the device is considered offline.
    pub fn offline_after(&self, missed_threshold: u32, fallback: Duration) -> Duration {
        if self.is_polled() {
            let periods = u64::from(missed_threshold).saturating_add(1);
            Duration::from_secs(self.polling_interval_secs.saturating_mul(periods))
        } else {
            fallback
        }
    }
}
