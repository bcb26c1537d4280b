//! Domain layer - Pure facility telemetry rules with no external dependencies
//!
//! This crate contains:
//! - Devices, rack placements and their validation
//! - Readings and numeric field extraction
//! - Derived metric formulas (PUE, power-analyzer totals, billing)
//! - Command/response correlation types
//! - Domain Events
//! - Repository and store interfaces (traits)
//!
//! Principles:
//! - No dependencies on infrastructure
//! - Formulas are pure functions over already-extracted values
//! - Testable in isolation

pub mod command;
pub mod device;
pub mod error;
pub mod event;
pub mod metric;
pub mod rack;
pub mod reading;
pub mod store;

// Re-export commonly used types
pub use command::{CommandError, CommandReply, CommandRequest, CommandResponse, CorrelationId};
pub use device::{DeviceId, DeviceProfile, DeviceStatus, Protocol};
pub use error::{DomainError, MetricError};
pub use event::DomainEvent;
pub use metric::{MetricKey, MetricSample, MetricValue};
pub use reading::{Quality, Reading, ReadingSource};
