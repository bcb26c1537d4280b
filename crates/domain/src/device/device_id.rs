use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};

/// Value object representing a Device identifier
///
/// Rules:
/// - Must be non-empty
/// - Must contain only ASCII alphanumerics, underscore, hyphen and dot
/// - Max length 100 characters
///
/// The id is used verbatim as a single MQTT topic level, so `/`, `+` and
/// `#` are never accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new DeviceId with validation
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();

        if id.is_empty() {
            return Err(DomainError::InvalidDeviceId(
                "Device ID cannot be empty".to_string(),
            ));
        }

        if id.len() > 100 {
            return Err(DomainError::InvalidDeviceId(format!(
                "Device ID too long: {} chars (max 100)",
                id.len()
            )));
        }

        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(DomainError::InvalidDeviceId(format!(
                "Device ID {id} must contain only alphanumeric, underscore, hyphen and dot"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_device_id() {
        let id = DeviceId::new("pdu-rack-a1").unwrap();
        assert_eq!(id.as_str(), "pdu-rack-a1");
    }

    #[test]
    fn test_device_id_with_dot_and_underscore() {
        let id = DeviceId::new("chiller_2.main").unwrap();
        assert_eq!(id.as_str(), "chiller_2.main");
    }

    #[test]
    fn test_empty_device_id() {
        let result = DeviceId::new("");
        assert_eq!(
            result.unwrap_err(),
            DomainError::InvalidDeviceId("Device ID cannot be empty".to_string())
        );
    }

    #[test]
    fn test_device_id_too_long() {
        assert!(DeviceId::new("A".repeat(101)).is_err());
        assert!(DeviceId::new("A".repeat(100)).is_ok());
    }

    #[test]
    fn test_device_id_rejects_topic_separators() {
        assert!(DeviceId::new("site/meter").is_err());
        assert!(DeviceId::new("meter+").is_err());
        assert!(DeviceId::new("#").is_err());
    }

    #[test]
    fn test_device_id_deserialize_validates() {
        let ok: DeviceId = serde_json::from_str("\"ups-1\"").unwrap();
        assert_eq!(ok.as_str(), "ups-1");

        let bad = serde_json::from_str::<DeviceId>("\"ups/1\"");
        assert!(bad.is_err());
    }
}
