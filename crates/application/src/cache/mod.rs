//! Rolling cache of the last payload of every device.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use domain::device::DeviceId;
use domain::reading::Reading;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Accepted,
    /// Older than the cached reading, nothing changed
    Rejected,
}

#[derive(Debug)]
struct CacheEntry {
    latest: Reading,
    /// Accepted readings, oldest first
    history: VecDeque<Reading>,
}

pub struct ReadingCache {
    entries: DashMap<DeviceId, CacheEntry>,
    history_depth: usize,
    stale_after: Duration,
}

impl ReadingCache {
    pub fn new(history_depth: usize, stale_after: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            history_depth: history_depth.max(1),
            stale_after,
        }
    }

    /// Keep the reading with the newest `measured_at`.
    ///
    /// An equal timestamp replaces the entry in place, so a redelivered
    /// message does not grow the history.
    pub fn upsert(&self, reading: Reading) -> CacheOutcome {
        match self.entries.entry(reading.device_id.clone()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if reading.measured_at < entry.latest.measured_at {
                    return CacheOutcome::Rejected;
                }

                if reading.measured_at == entry.latest.measured_at {
                    entry.history.pop_back();
                }
                entry.history.push_back(reading.clone());
                while entry.history.len() > self.history_depth {
                    entry.history.pop_front();
                }
                entry.latest = reading;
                CacheOutcome::Accepted
            }
            Entry::Vacant(vacant) => {
                let mut history = VecDeque::with_capacity(self.history_depth);
                history.push_back(reading.clone());
                vacant.insert(CacheEntry {
                    latest: reading,
                    history,
                });
                CacheOutcome::Accepted
            }
        }
    }

    pub fn latest(&self, device_id: &DeviceId) -> Option<Reading> {
        self.entries.get(device_id).map(|e| e.latest.clone())
    }

    /// Recent readings of a device, oldest first
    pub fn history(&self, device_id: &DeviceId) -> Vec<Reading> {
        self.entries
            .get(device_id)
            .map(|e| e.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Latest reading of every device, ordered by device id
    pub fn snapshot(&self) -> Vec<Reading> {
        let mut readings: Vec<Reading> = self.entries.iter().map(|e| e.latest.clone()).collect();
        readings.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        readings
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    /// A reading measured in the future counts as fresh.
    pub fn is_fresh(&self, reading: &Reading, now: DateTime<Utc>) -> bool {
        match reading.age(now).to_std() {
            Ok(age) => age <= self.stale_after,
            Err(_) => true,
        }
    }

    /// Seed from persisted snapshots. Returns how many were accepted.
    pub fn warm(&self, readings: Vec<Reading>) -> usize {
        readings
            .into_iter()
            .filter(|r| self.upsert(r.clone()) == CacheOutcome::Accepted)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::reading::ReadingSource;
    use serde_json::json;

    fn reading(device: &str, ts_ms: i64, kw: f64) -> Reading {
        Reading::from_payload(
            DeviceId::new(device).unwrap(),
            json!({"kw": kw, "ts": ts_ms}),
            Utc::now(),
            ReadingSource::Telemetry,
        )
        .unwrap()
    }

    #[test]
    fn test_newer_reading_replaces_older() {
        let cache = ReadingCache::new(10, Duration::from_secs(300));
        assert_eq!(cache.upsert(reading("m1", 1_000, 1.0)), CacheOutcome::Accepted);
        assert_eq!(cache.upsert(reading("m1", 2_000, 2.0)), CacheOutcome::Accepted);

        let id = DeviceId::new("m1").unwrap();
        assert_eq!(cache.latest(&id).unwrap().number("kw"), Some(2.0));
        assert_eq!(cache.history(&id).len(), 2);
    }

    #[test]
    fn test_out_of_order_reading_rejected() {
        let cache = ReadingCache::new(10, Duration::from_secs(300));
        cache.upsert(reading("m1", 2_000, 2.0));
        assert_eq!(cache.upsert(reading("m1", 1_000, 1.0)), CacheOutcome::Rejected);

        let id = DeviceId::new("m1").unwrap();
        assert_eq!(cache.latest(&id).unwrap().number("kw"), Some(2.0));
        assert_eq!(cache.history(&id).len(), 1);
    }

    #[test]
    fn test_equal_timestamp_replaces_without_growing_history() {
        let cache = ReadingCache::new(10, Duration::from_secs(300));
        cache.upsert(reading("m1", 1_000, 1.0));
        assert_eq!(cache.upsert(reading("m1", 1_000, 1.5)), CacheOutcome::Accepted);

        let id = DeviceId::new("m1").unwrap();
        assert_eq!(cache.latest(&id).unwrap().number("kw"), Some(1.5));
        assert_eq!(cache.history(&id).len(), 1);
    }

    #[test]
    fn test_history_is_bounded() {
        let cache = ReadingCache::new(3, Duration::from_secs(300));
        for i in 0..5 {
            cache.upsert(reading("m1", 1_000 * (i + 1), i as f64));
        }

        let history = cache.history(&DeviceId::new("m1").unwrap());
        let values: Vec<f64> = history.iter().filter_map(|r| r.number("kw")).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_freshness_window() {
        let cache = ReadingCache::new(10, Duration::from_secs(300));
        let r = reading("m1", 1_700_000_000_000, 1.0);
        let measured = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        assert!(cache.is_fresh(&r, measured + chrono::Duration::seconds(300)));
        assert!(!cache.is_fresh(&r, measured + chrono::Duration::seconds(301)));
        assert!(cache.is_fresh(&r, measured - chrono::Duration::seconds(5)));
    }

    #[test]
    fn test_warm_and_snapshot_order() {
        let cache = ReadingCache::new(10, Duration::from_secs(300));
        let accepted = cache.warm(vec![
            reading("ups-2", 1_000, 1.0),
            reading("ups-1", 1_000, 2.0),
            reading("ups-1", 500, 3.0),
        ]);

        assert_eq!(accepted, 2);
        assert_eq!(cache.len(), 2);
        let ids: Vec<String> = cache
            .snapshot()
            .iter()
            .map(|r| r.device_id.to_string())
            .collect();
        assert_eq!(ids, vec!["ups-1", "ups-2"]);
    }
}
