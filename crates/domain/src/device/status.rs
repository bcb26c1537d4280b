use serde::{Deserialize, Serialize};

/// Device reachability as observed by the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DeviceStatus {
    /// Device reported within its expected interval
    Online,
    /// Device has been silent past its timeout, or its gateway went away
    Offline,
    /// Nothing heard yet
    #[default]
    Unknown,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a broker status payload: `ONLINE`, `OFFLINE` or `{"status": "..."}`
    pub fn from_payload(payload: &[u8]) -> Self {
        let text = String::from_utf8_lossy(payload);
        let raw = match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(serde_json::Value::Object(map)) => map
                .get("status")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => text.trim().to_string(),
        };

        match raw.to_ascii_uppercase().as_str() {
            "ONLINE" => Self::Online,
            "OFFLINE" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
