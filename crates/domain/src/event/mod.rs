use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod publisher;
pub use publisher::{EventPublisher, PublishError};

use crate::command::CorrelationId;
use crate::device::{DeviceId, DeviceStatus};
use crate::metric::{BillingStatement, MetricSample};
use crate::reading::Reading;

/// Domain events that can occur in the listener
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    /// A reading was accepted into the cache
    ReadingReceived { reading: Reading },

    /// Device reachability changed
    DeviceStatusChanged {
        device_id: DeviceId,
        old_status: DeviceStatus,
        new_status: DeviceStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A derived metric was recomputed
    MetricComputed { sample: MetricSample },

    /// A billing period was closed by a reading from the next month
    BillingPeriodClosed {
        statement: BillingStatement,
        timestamp: DateTime<Utc>,
    },

    /// A correlated response arrived for a dispatched command
    CommandCompleted {
        correlation_id: CorrelationId,
        device_id: DeviceId,
        command: String,
        success: bool,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// No response arrived before the deadline
    CommandTimedOut {
        correlation_id: CorrelationId,
        device_id: DeviceId,
        command: String,
        timeout_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Listener heartbeat
    ListenerHeartbeat {
        listener_id: String,
        uptime_secs: u64,
        devices_online: usize,
        cached_devices: usize,
        pending_commands: usize,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn reading_received(reading: Reading) -> Self {
        Self::ReadingReceived { reading }
    }

    pub fn device_status_changed(
        device_id: DeviceId,
        old_status: DeviceStatus,
        new_status: DeviceStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self::DeviceStatusChanged {
            device_id,
            old_status,
            new_status,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn metric_computed(sample: MetricSample) -> Self {
        Self::MetricComputed { sample }
    }

    pub fn billing_period_closed(statement: BillingStatement) -> Self {
        Self::BillingPeriodClosed {
            statement,
            timestamp: Utc::now(),
        }
    }

    pub fn command_completed(
        correlation_id: CorrelationId,
        device_id: DeviceId,
        command: impl Into<String>,
        success: bool,
        latency_ms: u64,
    ) -> Self {
        Self::CommandCompleted {
            correlation_id,
            device_id,
            command: command.into(),
            success,
            latency_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn command_timed_out(
        correlation_id: CorrelationId,
        device_id: DeviceId,
        command: impl Into<String>,
        timeout_ms: u64,
    ) -> Self {
        Self::CommandTimedOut {
            correlation_id,
            device_id,
            command: command.into(),
            timeout_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn listener_heartbeat(
        listener_id: impl Into<String>,
        uptime_secs: u64,
        devices_online: usize,
        cached_devices: usize,
        pending_commands: usize,
    ) -> Self {
        Self::ListenerHeartbeat {
            listener_id: listener_id.into(),
            uptime_secs,
            devices_online,
            cached_devices,
            pending_commands,
            timestamp: Utc::now(),
        }
    }

    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ReadingReceived { reading } => reading.received_at,
            Self::DeviceStatusChanged { timestamp, .. } => *timestamp,
            Self::MetricComputed { sample } => sample.computed_at,
            Self::BillingPeriodClosed { timestamp, .. } => *timestamp,
            Self::CommandCompleted { timestamp, .. } => *timestamp,
            Self::CommandTimedOut { timestamp, .. } => *timestamp,
            Self::ListenerHeartbeat { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as string
    pub fn event_type(&self) -> &str {
        match self {
            Self::ReadingReceived { .. } => "ReadingReceived",
            Self::DeviceStatusChanged { .. } => "DeviceStatusChanged",
            Self::MetricComputed { .. } => "MetricComputed",
            Self::BillingPeriodClosed { .. } => "BillingPeriodClosed",
            Self::CommandCompleted { .. } => "CommandCompleted",
            Self::CommandTimedOut { .. } => "CommandTimedOut",
            Self::ListenerHeartbeat { .. } => "ListenerHeartbeat",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::ReadingSource;
    use serde_json::json;

    #[test]
    fn test_reading_received_event() {
        let reading = Reading::from_payload(
            DeviceId::new("meter-1").unwrap(),
            json!({"kw": 3.2}),
            Utc::now(),
            ReadingSource::Telemetry,
        )
        .unwrap();
        let event = DomainEvent::reading_received(reading.clone());

        assert_eq!(event.event_type(), "ReadingReceived");
        assert_eq!(event.timestamp(), reading.received_at);
    }

    #[test]
    fn test_device_status_changed_event() {
        let id = DeviceId::new("ups-2").unwrap();
        let event = DomainEvent::device_status_changed(
            id.clone(),
            DeviceStatus::Online,
            DeviceStatus::Offline,
            "heartbeat timeout",
        );

        match event {
            DomainEvent::DeviceStatusChanged {
                device_id,
                old_status,
                new_status,
                reason,
                ..
            } => {
                assert_eq!(device_id, id);
                assert_eq!(old_status, DeviceStatus::Online);
                assert_eq!(new_status, DeviceStatus::Offline);
                assert_eq!(reason, "heartbeat timeout");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_listener_heartbeat_event() {
        let event = DomainEvent::listener_heartbeat("listener-1", 60, 4, 7, 1);
        assert_eq!(event.event_type(), "ListenerHeartbeat");
    }

    #[test]
    fn test_event_serialization() {
        let event = DomainEvent::command_timed_out(
            CorrelationId::from("c-9"),
            DeviceId::new("door-1").unwrap(),
            "unlock",
            5000,
        );

        let json_str = serde_json::to_string(&event).unwrap();
        assert!(json_str.contains("\"type\":\"CommandTimedOut\""));
        let deserialized: DomainEvent = serde_json::from_str(&json_str).unwrap();
        assert_eq!(deserialized.event_type(), "CommandTimedOut");
    }
}
