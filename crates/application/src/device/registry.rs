use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domain::DomainEvent;
use domain::device::{DeviceId, DeviceProfile, DeviceStatus};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runtime view of a device as observed on the broker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    /// `false` for devices that only ever showed up on a telemetry topic
    pub registered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub id: DeviceId,
    pub profile: Option<DeviceProfile>,
    #[serde(flatten)]
    pub state: DeviceState,
}

/// Known device profiles plus their liveness
pub struct DeviceRegistry {
    profiles: DashMap<DeviceId, DeviceProfile>,
    states: DashMap<DeviceId, DeviceState>,
    missed_threshold: u32,
    fallback_offline_after: Duration,
}

impl DeviceRegistry {
    pub fn new(
        profiles: Vec<DeviceProfile>,
        missed_threshold: u32,
        fallback_offline_after: Duration,
    ) -> Self {
        let registry = Self {
            profiles: DashMap::new(),
            states: DashMap::new(),
            missed_threshold,
            fallback_offline_after,
        };
        for profile in profiles {
            registry.states.insert(
                profile.id.clone(),
                DeviceState {
                    status: DeviceStatus::Unknown,
                    last_seen: None,
                    registered: true,
                },
            );
            registry.profiles.insert(profile.id.clone(), profile);
        }
        registry
    }

    /// Stored profiles overlaid with configured ones; configuration wins.
    pub fn merge_profiles(
        stored: Vec<DeviceProfile>,
        configured: Vec<DeviceProfile>,
    ) -> Vec<DeviceProfile> {
        let mut merged: HashMap<DeviceId, DeviceProfile> =
            stored.into_iter().map(|p| (p.id.clone(), p)).collect();
        for profile in configured {
            merged.insert(profile.id.clone(), profile);
        }
        let mut profiles: Vec<DeviceProfile> = merged.into_values().collect();
        profiles.sort_by(|a, b| a.id.cmp(&b.id));
        profiles
    }

    pub fn profile(&self, device_id: &DeviceId) -> Option<DeviceProfile> {
        self.profiles.get(device_id).map(|p| p.clone())
    }

    pub fn is_registered(&self, device_id: &DeviceId) -> bool {
        self.profiles.contains_key(device_id)
    }

    /// Enabled devices with a polling interval
    pub fn polled_devices(&self) -> Vec<DeviceProfile> {
        let mut polled: Vec<DeviceProfile> = self
            .profiles
            .iter()
            .filter(|p| p.enabled && p.is_polled())
            .map(|p| p.clone())
            .collect();
        polled.sort_by(|a, b| a.id.cmp(&b.id));
        polled
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<DeviceView> {
        let state = self.states.get(device_id)?.clone();
        Some(DeviceView {
            id: device_id.clone(),
            profile: self.profile(device_id),
            state,
        })
    }

    pub fn list(&self) -> Vec<DeviceView> {
        let mut views: Vec<DeviceView> = self
            .states
            .iter()
            .map(|entry| DeviceView {
                id: entry.key().clone(),
                profile: self.profile(entry.key()),
                state: entry.value().clone(),
            })
            .collect();
        views.sort_by(|a, b| a.id.cmp(&b.id));
        views
    }

    pub fn online_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.status == DeviceStatus::Online)
            .count()
    }

    /// Data arrived from the device
    pub fn mark_seen(&self, device_id: &DeviceId, now: DateTime<Utc>) -> Option<DomainEvent> {
        let registered = self.is_registered(device_id);
        let mut state = self
            .states
            .entry(device_id.clone())
            .or_insert_with(|| {
                debug!(device_id = %device_id, "Caching data from unregistered device");
                DeviceState {
                    status: DeviceStatus::Unknown,
                    last_seen: None,
                    registered,
                }
            });

        state.last_seen = Some(now);
        if state.status == DeviceStatus::Online {
            return None;
        }

        let old = state.status;
        state.status = DeviceStatus::Online;
        info!(device_id = %device_id, "✅ Device online");
        Some(DomainEvent::device_status_changed(
            device_id.clone(),
            old,
            DeviceStatus::Online,
            "data received",
        ))
    }

    /// Status announced on the broker (device or gateway LWT)
    pub fn apply_status(
        &self,
        device_id: &DeviceId,
        status: DeviceStatus,
        now: DateTime<Utc>,
    ) -> Option<DomainEvent> {
        if status == DeviceStatus::Unknown {
            warn!(device_id = %device_id, "Ignoring unrecognised status payload");
            return None;
        }

        let registered = self.is_registered(device_id);
        let mut state = self
            .states
            .entry(device_id.clone())
            .or_insert_with(|| DeviceState {
                status: DeviceStatus::Unknown,
                last_seen: None,
                registered,
            });

        if status == DeviceStatus::Online {
            state.last_seen = Some(now);
        }
        if state.status == status {
            return None;
        }

        let old = state.status;
        state.status = status;
        info!(device_id = %device_id, status = %status, "Device reported status");
        Some(DomainEvent::device_status_changed(
            device_id.clone(),
            old,
            status,
            "broker status",
        ))
    }

    /// Mark silent devices offline and return the transitions
    pub fn check_liveness(&self, now: DateTime<Utc>) -> Vec<DomainEvent> {
        let mut events = Vec::new();

        for mut entry in self.states.iter_mut() {
            if entry.status != DeviceStatus::Online {
                continue;
            }
            let Some(last_seen) = entry.last_seen else {
                continue;
            };

            let offline_after = self
                .profiles
                .get(entry.key())
                .map(|p| p.offline_after(self.missed_threshold, self.fallback_offline_after))
                .unwrap_or(self.fallback_offline_after);

            let silent_for = (now - last_seen).to_std().unwrap_or(Duration::ZERO);
            if silent_for > offline_after {
                warn!(
                    device_id = %entry.key(),
                    silent_secs = silent_for.as_secs(),
                    "Device heartbeat timeout, marking offline"
                );
                entry.status = DeviceStatus::Offline;
                events.push(DomainEvent::device_status_changed(
                    entry.key().clone(),
                    DeviceStatus::Online,
                    DeviceStatus::Offline,
                    "heartbeat timeout",
                ));
            }
        }

        events
    }
}
