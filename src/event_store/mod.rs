//! Append-only event log
//!
//! - `event`: typed events and ingestion-time validation
//! - `store`: backend trait, time range, store errors
//! - `sqlite_store`: pooled SQLite backend

pub mod event;
pub mod sqlite_store;
pub mod store;

pub use event::{Event, EventPayload, TrackRequest, ValidationError};
pub use sqlite_store::SqliteStore;
pub use store::{EventStore, StoreError, TimeRange};
