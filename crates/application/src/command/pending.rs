use domain::command::{CommandError, CommandResponse, CorrelationId};
use domain::device::DeviceId;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A dispatched command waiting for its response
pub struct PendingCommand {
    pub device_id: DeviceId,
    pub command: String,
    pub issued_at: Instant,
    tx: oneshot::Sender<CommandResponse>,
}

impl PendingCommand {
    pub fn new(
        device_id: DeviceId,
        command: impl Into<String>,
        tx: oneshot::Sender<CommandResponse>,
    ) -> Self {
        Self {
            device_id,
            command: command.into(),
            issued_at: Instant::now(),
            tx,
        }
    }

    /// Wake the waiter. A waiter that already gave up is not an error.
    pub fn resolve(self, response: CommandResponse) {
        let _ = self.tx.send(response);
    }
}

/// In-flight command as shown by the API
#[derive(Debug, Clone, Serialize)]
pub struct PendingInfo {
    pub correlation_id: CorrelationId,
    pub device_id: DeviceId,
    pub command: String,
    pub age_ms: u64,
}

pub enum Take {
    Taken(PendingCommand),
    Unknown,
    DeviceMismatch { expected: DeviceId },
}

/// Correlation id -> waiter. Every entry leaves the map exactly once.
#[derive(Default)]
pub struct PendingCommands {
    inner: Mutex<HashMap<CorrelationId, PendingCommand>>,
}

pub struct PendingGuard<'a> {
    pending: &'a PendingCommands,
    correlation_id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.correlation_id);
    }
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PendingCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter unless `limit` commands are already in flight
    pub fn try_insert(
        &self,
        correlation_id: CorrelationId,
        entry: PendingCommand,
        limit: usize,
    ) -> Result<(), CommandError> {
        let mut pending = lock_ignore_poison(&self.inner);
        if pending.len() >= limit {
            return Err(CommandError::Busy { limit });
        }
        pending.insert(correlation_id, entry);
        Ok(())
    }

    pub fn remove(&self, correlation_id: &CorrelationId) -> Option<PendingCommand> {
        lock_ignore_poison(&self.inner).remove(correlation_id)
    }

    /// Removes the entry when the waiting future goes away, whether it
    /// finished or was cancelled.
    pub fn guard(&self, correlation_id: CorrelationId) -> PendingGuard<'_> {
        PendingGuard {
            pending: self,
            correlation_id,
        }
    }

    /// Remove the entry only when the response came from the device it was
    /// sent to.
    pub fn take_for(&self, correlation_id: &CorrelationId, device_id: &DeviceId) -> Take {
        let mut pending = lock_ignore_poison(&self.inner);
        match pending.get(correlation_id) {
            None => Take::Unknown,
            Some(entry) if &entry.device_id != device_id => Take::DeviceMismatch {
                expected: entry.device_id.clone(),
            },
            Some(_) => match pending.remove(correlation_id) {
                Some(entry) => Take::Taken(entry),
                None => Take::Unknown,
            },
        }
    }

    pub fn len(&self) -> usize {
        lock_ignore_poison(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<PendingInfo> {
        let pending = lock_ignore_poison(&self.inner);
        let now = Instant::now();
        let mut infos: Vec<(Instant, PendingInfo)> = pending
            .iter()
            .map(|(id, entry)| {
                (
                    entry.issued_at,
                    PendingInfo {
                        correlation_id: id.clone(),
                        device_id: entry.device_id.clone(),
                        command: entry.command.clone(),
                        age_ms: now.duration_since(entry.issued_at).as_millis() as u64,
                    },
                )
            })
            .collect();
        infos.sort_by_key(|(issued_at, _)| *issued_at);
        infos.into_iter().map(|(_, info)| info).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(device: &str) -> (PendingCommand, oneshot::Receiver<CommandResponse>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingCommand::new(DeviceId::new(device).unwrap(), "read", tx),
            rx,
        )
    }

    #[tokio::test]
    async fn test_limit_enforced() {
        let pending = PendingCommands::new();
        let (a, _rx_a) = entry("ups-1");
        let (b, _rx_b) = entry("ups-1");

        pending.try_insert(CorrelationId::generate(), a, 1).unwrap();
        assert_eq!(
            pending.try_insert(CorrelationId::generate(), b, 1),
            Err(CommandError::Busy { limit: 1 })
        );
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_take_for_checks_device() {
        let pending = PendingCommands::new();
        let id = CorrelationId::generate();
        let (a, rx) = entry("ups-1");
        pending.try_insert(id.clone(), a, 8).unwrap();

        let other = DeviceId::new("ups-2").unwrap();
        assert!(matches!(
            pending.take_for(&id, &other),
            Take::DeviceMismatch { .. }
        ));
        assert_eq!(pending.len(), 1);

        let owner = DeviceId::new("ups-1").unwrap();
        match pending.take_for(&id, &owner) {
            Take::Taken(entry) => entry.resolve(CommandResponse::ok(id.clone(), serde_json::json!({}))),
            _ => panic!("entry should be taken"),
        }
        assert!(pending.is_empty());
        assert!(rx.await.is_ok());
        assert!(matches!(pending.take_for(&id, &owner), Take::Unknown));
    }

    #[tokio::test]
    async fn test_guard_releases_entry() {
        let pending = PendingCommands::new();
        let id = CorrelationId::generate();
        let (a, _rx) = entry("ups-1");
        pending.try_insert(id.clone(), a, 1).unwrap();

        {
            let _guard = pending.guard(id.clone());
            assert_eq!(pending.len(), 1);
        }
        assert!(pending.is_empty());

        // Already removed: dropping another guard is a no-op
        drop(pending.guard(id));
        assert!(pending.is_empty());
    }
}
