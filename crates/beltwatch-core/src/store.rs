//! Event store interface
//!
//! Durable storage of stop events keyed by an auto-assigned id and indexed by
//! start time, plus a small key/value area for settings. Every write is a
//! single atomic append or upsert; nothing here needs cross-record
//! transactions.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::errors::StoreError;
use crate::types::{ConfigSnapshot, EventId, StopEvent};

/// Setting keys used by the session
pub mod keys {
    pub const SCHEDULE: &str = "schedule";
    pub const BREAKS: &str = "breaks";
    pub const THRESHOLDS: &str = "thresholds";
    pub const TZ_OFFSET_MINUTES: &str = "tz_offset_minutes";
    pub const LAST_SYNC_INDEX: &str = "last_sync_index";
}

// ----------------------------------------------------------------------------
// Store Trait
// ----------------------------------------------------------------------------

#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append one event, returning its new identity
    async fn append_event(&self, event: &StopEvent) -> Result<EventId, StoreError>;

    /// Events whose start lies in `[from, to]` (inclusive), by start time ascending
    async fn query_events_in_range(
        &self,
        from_epoch_seconds: i64,
        to_epoch_seconds: i64,
    ) -> Result<Vec<StopEvent>, StoreError>;

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Read a JSON-encoded setting, falling back to `default` when absent
pub async fn get_setting_or<S, T>(store: &S, key: &str, default: T) -> Result<T, StoreError>
where
    S: EventStore + ?Sized,
    T: DeserializeOwned,
{
    match store.get_setting(key).await? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::CorruptValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Rebuild the last-sent configuration, field by field
///
/// A corrupt setting is logged and replaced by the value from `defaults`
/// rather than failing startup.
pub async fn load_config_snapshot<S>(store: &S, defaults: ConfigSnapshot) -> Result<ConfigSnapshot, StoreError>
where
    S: EventStore + ?Sized,
{
    Ok(ConfigSnapshot {
        schedule: setting_or_warn(store, keys::SCHEDULE, defaults.schedule).await?,
        breaks: setting_or_warn(store, keys::BREAKS, defaults.breaks).await?,
        thresholds: setting_or_warn(store, keys::THRESHOLDS, defaults.thresholds).await?,
        tz_offset_minutes: load_tz_offset_minutes(store, defaults.tz_offset_minutes).await?,
    })
}

/// UTC offset last chosen by the operator, or `default` when none was stored
pub async fn load_tz_offset_minutes<S>(store: &S, default: i32) -> Result<i32, StoreError>
where
    S: EventStore + ?Sized,
{
    setting_or_warn(store, keys::TZ_OFFSET_MINUTES, default).await
}

async fn setting_or_warn<S, T>(store: &S, key: &str, default: T) -> Result<T, StoreError>
where
    S: EventStore + ?Sized,
    T: DeserializeOwned + Copy,
{
    match get_setting_or(store, key, default).await {
        Err(StoreError::CorruptValue { key, reason }) => {
            warn!("Ignoring stored {}: {}", key, reason);
            Ok(default)
        }
        other => other,
    }
}

// ----------------------------------------------------------------------------
// In-Memory Store
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    events: BTreeMap<EventId, StopEvent>,
    settings: BTreeMap<String, String>,
}

/// Volatile [`EventStore`] for tests and dry runs
///
/// Clones share the same contents, so a test can keep a handle while the
/// runtime owns another.
#[derive(Debug, Default, Clone)]
pub struct MemoryEventStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events
    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.events.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Backend {
            reason: "memory store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn append_event(&self, event: &StopEvent) -> Result<EventId, StoreError> {
        let mut inner = self.lock()?;
        inner.next_id += 1;
        let id = EventId(inner.next_id);
        inner.events.insert(id, event.clone());
        Ok(id)
    }

    async fn query_events_in_range(
        &self,
        from_epoch_seconds: i64,
        to_epoch_seconds: i64,
    ) -> Result<Vec<StopEvent>, StoreError> {
        let inner = self.lock()?;
        let mut matching: Vec<(EventId, StopEvent)> = inner
            .events
            .iter()
            .filter(|(_, e)| (from_epoch_seconds..=to_epoch_seconds).contains(&e.start_epoch_seconds))
            .map(|(id, e)| (*id, e.clone()))
            .collect();
        matching.sort_by_key(|(id, e)| (e.start_epoch_seconds, *id));
        Ok(matching.into_iter().map(|(_, e)| e).collect())
    }

    async fn get_setting(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.settings.get(key).cloned())
    }

    async fn put_setting(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.settings.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScheduleWindow;

    #[tokio::test]
    async fn test_memory_store_range_is_inclusive_and_ordered() {
        let store = MemoryEventStore::new();
        let from = 1_700_000_000;
        for start in [from + 86_399, from - 1, from + 10, from, from + 86_400] {
            store
                .append_event(&StopEvent::new(start, 1000, "BS-1", None))
                .await
                .unwrap();
        }

        let events = store.query_events_in_range(from, from + 86_399).await.unwrap();
        let starts: Vec<i64> = events.iter().map(|e| e.start_epoch_seconds).collect();
        assert_eq!(starts, vec![from, from + 10, from + 86_399]);
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let store = MemoryEventStore::new();
        let event = StopEvent::new(1, 2, "BS-1", Some(3));
        let first = store.append_event(&event).await.unwrap();
        let second = store.append_event(&event).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_config_snapshot_falls_back_on_corrupt_values() {
        let store = MemoryEventStore::new();
        let schedule = ScheduleWindow {
            start_min: 300,
            end_min: 900,
            enabled: false,
        };
        store
            .put_setting(keys::SCHEDULE, &serde_json::to_string(&schedule).unwrap())
            .await
            .unwrap();
        store.put_setting(keys::BREAKS, "{not json").await.unwrap();

        let snapshot = load_config_snapshot(&store, ConfigSnapshot::default())
            .await
            .unwrap();
        assert_eq!(snapshot.schedule, schedule);
        assert_eq!(snapshot.breaks, ConfigSnapshot::default().breaks);
    }

    #[tokio::test]
    async fn test_tz_offset_prefers_stored_value() {
        let store = MemoryEventStore::new();
        assert_eq!(load_tz_offset_minutes(&store, 60).await.unwrap(), 60);

        store.put_setting(keys::TZ_OFFSET_MINUTES, "-300").await.unwrap();
        assert_eq!(load_tz_offset_minutes(&store, 60).await.unwrap(), -300);
    }

    #[tokio::test]
    async fn test_clones_share_contents() {
        let store = MemoryEventStore::new();
        let handle = store.clone();
        store
            .append_event(&StopEvent::new(1, 2, "BS-1", None))
            .await
            .unwrap();
        assert_eq!(handle.len(), 1);
    }
}
