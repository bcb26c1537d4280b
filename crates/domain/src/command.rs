//! Device command request/response correlation types.

use crate::device::DeviceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identifier carried in-band in both the request and its response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Published on the device's command topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub correlation_id: CorrelationId,
    pub device_id: DeviceId,
    pub command: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub protocol: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    Error,
}

/// Received on the device's response topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub correlation_id: CorrelationId,
    pub status: CommandStatus,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl CommandResponse {
    pub fn ok(correlation_id: CorrelationId, data: serde_json::Value) -> Self {
        Self {
            correlation_id,
            status: CommandStatus::Ok,
            data,
            error: None,
        }
    }

    pub fn error(correlation_id: CorrelationId, message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            status: CommandStatus::Error,
            data: serde_json::Value::Null,
            error: Some(message.into()),
        }
    }
}

/// Successful outcome of a dispatched command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandReply {
    pub correlation_id: CorrelationId,
    pub device_id: DeviceId,
    pub command: String,
    pub data: serde_json::Value,
    pub latency_ms: u64,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommandError {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Device {0} is disabled")]
    DeviceDisabled(String),

    #[error("Too many commands in flight (limit {limit})")]
    Busy { limit: usize },

    #[error("Failed to publish command: {0}")]
    Publish(String),

    #[error("No response within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Device rejected command: {0}")]
    Rejected(String),
}
