//! SQLite-backed persistence for Beltwatch.
//!
//! Stop events received from the sensor are appended to an `events` table
//! indexed by start time; the last configuration pushed to the device and the
//! last acknowledged sync index live in a small `settings` table. The
//! [`SqliteEventStore`] implements [`beltwatch_core::EventStore`] so the
//! session runtime can use it directly.
//!
//! The [`export`] module turns a day, a month or the whole history into CSV.
//!
//! # Example
//!
//! ```no_run
//! use beltwatch_core::StopEvent;
//! use beltwatch_store::{export, ExportRange, SqliteEventStore};
//!
//! let store = SqliteEventStore::open("beltwatch.db")?;
//! store.append(&StopEvent::new(1_700_000_000, 4523, "BS-0042", Some(17)))?;
//!
//! let (from, to) = ExportRange::parse_day("2023-11-14")?.bounds(60)?;
//! let events = store.events_between(from, to)?;
//! print!("{}", export::render_csv(&events, 60)?);
//! # Ok::<(), beltwatch_store::Error>(())
//! ```

mod error;
pub mod export;
mod sqlite;

pub use error::{Error, Result};
pub use export::{render_csv, ExportRange};
pub use sqlite::SqliteEventStore;
