//! Storage boundary for persisted daily activity records.
//!
//! The engine talks to the record table through the [`DailyRecordStore`]
//! trait using a plain read-modify-write contract: fetch the row for a key,
//! add the drained counters, write it back (or insert when absent). There is
//! no server-side atomic increment and no version token, so two engine
//! instances flushing the same key can lose an update to each other. That
//! race is accepted; callers wanting stronger guarantees need a different
//! contract at this boundary.
//!
//! Two implementations ship here: [`SqliteStore`] for real persistence and
//! [`MemoryStore`] for tests, including injected read/write failures to
//! exercise the engine's best-effort error paths.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::NaiveDate;
use ta_core::{DailyRecord, DailyRecordKey};
use thiserror::Error;

mod sqlite;

pub use sqlite::SqliteStore;

/// Daily record store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The backend could not be reached.
    #[error("daily record store unavailable: {0}")]
    Unavailable(String),
    /// An insert collided with an existing row for the same key.
    #[error("daily record already exists for {user_id} on {date}")]
    Duplicate { user_id: String, date: NaiveDate },
    /// An update matched no existing row.
    #[error("no daily record to update for {user_id} on {date}")]
    MissingRecord { user_id: String, date: NaiveDate },
    /// A stored timestamp could not be parsed.
    #[error("invalid stored timestamp: {value}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// The persisted daily record table, keyed by
/// `(user_id, date, session_id|absent, course_id|absent)`.
#[async_trait]
pub trait DailyRecordStore: Send + Sync {
    /// Fetches the record for a key, if one exists.
    async fn fetch(&self, key: &DailyRecordKey) -> Result<Option<DailyRecord>, StoreError>;

    /// Inserts a new record. Fails if the key already has one.
    async fn insert(&self, record: &DailyRecord) -> Result<(), StoreError>;

    /// Overwrites the record for an existing key.
    async fn update(&self, record: &DailyRecord) -> Result<(), StoreError>;
}

/// In-memory store for tests.
///
/// Read and write failures can be injected to drive the engine's
/// swallow-and-log error paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<DailyRecordKey, DailyRecord>>,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent `fetch` calls fail.
    pub fn set_fail_reads(&self, fail: bool) {
        *lock(&self.fail_reads) = fail;
    }

    /// Makes subsequent `insert`/`update` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    /// Returns the stored record for a key, if any.
    #[must_use]
    pub fn record(&self, key: &DailyRecordKey) -> Option<DailyRecord> {
        lock(&self.records).get(key).cloned()
    }

    /// Returns all stored records.
    #[must_use]
    pub fn records(&self) -> Vec<DailyRecord> {
        lock(&self.records).values().cloned().collect()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.records).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.records).is_empty()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl DailyRecordStore for MemoryStore {
    async fn fetch(&self, key: &DailyRecordKey) -> Result<Option<DailyRecord>, StoreError> {
        if *lock(&self.fail_reads) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(lock(&self.records).get(key).cloned())
    }

    async fn insert(&self, record: &DailyRecord) -> Result<(), StoreError> {
        if *lock(&self.fail_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        let mut records = lock(&self.records);
        if records.contains_key(&record.key) {
            return Err(StoreError::Duplicate {
                user_id: record.key.user_id.to_string(),
                date: record.key.date,
            });
        }
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, record: &DailyRecord) -> Result<(), StoreError> {
        if *lock(&self.fail_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        let mut records = lock(&self.records);
        if !records.contains_key(&record.key) {
            return Err(StoreError::MissingRecord {
                user_id: record.key.user_id.to_string(),
                date: record.key.date,
            });
        }
        records.insert(record.key.clone(), record.clone());
        Ok(())
    }
}
