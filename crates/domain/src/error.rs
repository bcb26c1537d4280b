use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors raised while deriving a metric from cached readings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricError {
    #[error("No reading cached for device {0}")]
    MissingInput(String),

    #[error("Field '{field}' of device {device_id} is not numeric")]
    InvalidField { device_id: String, field: String },

    #[error("Invalid metric input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
