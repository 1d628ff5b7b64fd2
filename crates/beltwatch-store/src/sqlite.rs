//! SQLite event store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use beltwatch_core::{EventId, EventStore, StopEvent, StoreError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::Result;

/// SQLite-backed stop event store.
///
/// rusqlite connections are not `Sync`, so calls are serialised through a
/// mutex; each call is a single statement and finishes before the lock is
/// released.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self::from_connection(Connection::open(path)?)?;
        debug!("Opened event store at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_epoch INTEGER NOT NULL,
                duration_ms INTEGER NOT NULL,
                device_id TEXT NOT NULL,
                accum_stops INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_events_start
                ON events(start_epoch);
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // statements never panic mid-way, so a poisoned lock still holds a usable connection
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event, returning its row id.
    pub fn append(&self, event: &StopEvent) -> Result<EventId> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO events (start_epoch, duration_ms, device_id, accum_stops)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                event.start_epoch_seconds,
                event.duration_ms,
                event.device_id,
                event.accum_stops,
            ],
        )?;
        Ok(EventId(conn.last_insert_rowid()))
    }

    /// Events starting within `[from, to]`, oldest first.
    pub fn events_between(&self, from: i64, to: i64) -> Result<Vec<StopEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT start_epoch, duration_ms, device_id, accum_stops FROM events
             WHERE start_epoch BETWEEN ?1 AND ?2
             ORDER BY start_epoch, id",
        )?;
        let events = stmt
            .query_map(params![from, to], row_to_event)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Every stored event, oldest first.
    pub fn all_events(&self) -> Result<Vec<StopEvent>> {
        self.events_between(i64::MIN, i64::MAX)
    }

    pub fn count_events(&self) -> Result<u64> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    pub fn setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .lock()
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.lock().execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StopEvent> {
    Ok(StopEvent {
        start_epoch_seconds: row.get(0)?,
        duration_ms: row.get(1)?,
        device_id: row.get(2)?,
        accum_stops: row.get(3)?,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append_event(&self, event: &StopEvent) -> std::result::Result<EventId, StoreError> {
        Ok(self.append(event)?)
    }

    async fn query_events_in_range(
        &self,
        from_epoch_seconds: i64,
        to_epoch_seconds: i64,
    ) -> std::result::Result<Vec<StopEvent>, StoreError> {
        Ok(self.events_between(from_epoch_seconds, to_epoch_seconds)?)
    }

    async fn get_setting(&self, key: &str) -> std::result::Result<Option<String>, StoreError> {
        Ok(self.setting(key)?)
    }

    async fn put_setting(&self, key: &str, value: &str) -> std::result::Result<(), StoreError> {
        Ok(self.set_setting(key, value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(start: i64, duration_ms: i64) -> StopEvent {
        StopEvent::new(start, duration_ms, "BS-0042", Some(start / 100))
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let store = SqliteEventStore::in_memory().unwrap();
        let first = store.append(&event(100, 1)).unwrap();
        let second = store.append(&event(50, 2)).unwrap();
        assert!(second.0 > first.0);
        assert_eq!(store.count_events().unwrap(), 2);
    }

    #[test]
    fn test_range_is_inclusive_and_sorted() {
        let store = SqliteEventStore::in_memory().unwrap();
        for start in [300, 100, 200, 400] {
            store.append(&event(start, 10)).unwrap();
        }

        let starts: Vec<i64> = store
            .events_between(100, 300)
            .unwrap()
            .iter()
            .map(|e| e.start_epoch_seconds)
            .collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn test_equal_starts_keep_insertion_order() {
        let store = SqliteEventStore::in_memory().unwrap();
        store.append(&event(100, 1)).unwrap();
        store.append(&event(100, 2)).unwrap();

        let durations: Vec<i64> = store.all_events().unwrap().iter().map(|e| e.duration_ms).collect();
        assert_eq!(durations, vec![1, 2]);
    }

    #[test]
    fn test_missing_accum_stops_round_trips_as_none() {
        let store = SqliteEventStore::in_memory().unwrap();
        store.append(&StopEvent::new(5, 6, "", None)).unwrap();
        assert_eq!(store.all_events().unwrap()[0].accum_stops, None);
    }

    #[test]
    fn test_settings_upsert() {
        let store = SqliteEventStore::in_memory().unwrap();
        assert_eq!(store.setting("last_sync_index").unwrap(), None);

        store.set_setting("last_sync_index", "7").unwrap();
        store.set_setting("last_sync_index", "42").unwrap();
        assert_eq!(store.setting("last_sync_index").unwrap(), Some("42".to_string()));
    }
}
