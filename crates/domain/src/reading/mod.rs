mod field;
mod quality;

pub use field::extract_number;
pub use quality::Quality;

use crate::device::DeviceId;
use crate::error::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingSource {
    /// Unsolicited payload on the telemetry topic
    Telemetry,
    /// Data returned by a correlated `read` command
    PollResponse,
}

/// A single device payload as cached by the listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: DeviceId,
    pub payload: serde_json::Value,
    pub measured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub source: ReadingSource,
}

impl Reading {
    /// Build a reading from a raw JSON object.
    ///
    /// `measured_at` is taken from `ts` (epoch ms) or `timestamp` (RFC 3339)
    /// when the payload carries one, otherwise from `received_at`.
    pub fn from_payload(
        device_id: DeviceId,
        payload: serde_json::Value,
        received_at: DateTime<Utc>,
        source: ReadingSource,
    ) -> Result<Self> {
        let Some(map) = payload.as_object() else {
            return Err(DomainError::InvalidPayload(format!(
                "Reading from {device_id} is not a JSON object"
            )));
        };

        let measured_at = map
            .get("ts")
            .and_then(|v| v.as_i64())
            .and_then(DateTime::from_timestamp_millis)
            .or_else(|| {
                map.get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                    .map(|dt| dt.with_timezone(&Utc))
            })
            .unwrap_or(received_at);

        Ok(Self {
            device_id,
            payload,
            measured_at,
            received_at,
            source,
        })
    }

    /// Numeric field of the payload, see [`extract_number`]
    pub fn number(&self, path: &str) -> Option<f64> {
        extract_number(&self.payload, path)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.measured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn id() -> DeviceId {
        DeviceId::new("meter-1").unwrap()
    }

    #[test]
    fn test_measured_at_from_epoch_millis() {
        let now = Utc::now();
        let reading = Reading::from_payload(
            id(),
            json!({"ts": 1_700_000_000_000i64, "kw": 12.5}),
            now,
            ReadingSource::Telemetry,
        )
        .unwrap();

        assert_eq!(
            reading.measured_at,
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
        );
        assert_eq!(reading.received_at, now);
    }

    #[test]
    fn test_measured_at_from_rfc3339() {
        let reading = Reading::from_payload(
            id(),
            json!({"timestamp": "2024-03-01T10:00:00+02:00"}),
            Utc::now(),
            ReadingSource::Telemetry,
        )
        .unwrap();

        assert_eq!(
            reading.measured_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_measured_at_falls_back_to_received_at() {
        let now = Utc::now();
        let reading =
            Reading::from_payload(id(), json!({"kw": 1}), now, ReadingSource::PollResponse)
                .unwrap();
        assert_eq!(reading.measured_at, now);
    }

    #[test]
    fn test_non_object_payload_rejected() {
        let result = Reading::from_payload(id(), json!([1, 2]), Utc::now(), ReadingSource::Telemetry);
        assert!(matches!(result, Err(DomainError::InvalidPayload(_))));
    }
}
