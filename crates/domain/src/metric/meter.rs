use crate::device::DeviceId;
use crate::error::MetricError;
use crate::reading::Reading;
use serde::{Deserialize, Serialize};

/// A numeric field of one device's payload, scaled into the unit the
/// metric expects (kW for power, kWh for energy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterRef {
    pub device_id: DeviceId,
    pub field: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl MeterRef {
    pub fn new(device_id: DeviceId, field: impl Into<String>) -> Self {
        Self {
            device_id,
            field: field.into(),
            scale: 1.0,
        }
    }

    pub fn scaled(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn resolve(&self, reading: &Reading) -> Result<f64, MetricError> {
        reading
            .number(&self.field)
            .map(|v| v * self.scale)
            .ok_or_else(|| MetricError::InvalidField {
                device_id: self.device_id.to_string(),
                field: self.field.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::ReadingSource;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_resolve_scales_value() {
        let id = DeviceId::new("ups-1").unwrap();
        let reading = Reading::from_payload(
            id.clone(),
            json!({"output": {"watts": 2500}}),
            Utc::now(),
            ReadingSource::Telemetry,
        )
        .unwrap();

        let meter = MeterRef::new(id, "output.watts").scaled(0.001);
        assert_eq!(meter.resolve(&reading).unwrap(), 2.5);
    }

    #[test]
    fn test_resolve_missing_field() {
        let id = DeviceId::new("ups-1").unwrap();
        let reading =
            Reading::from_payload(id.clone(), json!({}), Utc::now(), ReadingSource::Telemetry)
                .unwrap();

        let err = MeterRef::new(id, "kw").resolve(&reading).unwrap_err();
        assert_eq!(
            err,
            MetricError::InvalidField {
                device_id: "ups-1".into(),
                field: "kw".into()
            }
        );
    }
}
