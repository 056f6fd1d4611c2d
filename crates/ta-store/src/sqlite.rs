//! SQLite-backed daily record store.
//!
//! Timestamps are stored as ISO 8601 TEXT and dates as `YYYY-MM-DD` TEXT, so
//! lexicographic ordering matches chronological ordering and rows stay
//! human-readable.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use ta_core::{DailyRecord, DailyRecordKey};
use tokio::sync::Mutex;

use crate::{DailyRecordStore, StoreError};

/// Daily record store on a single SQLite connection.
///
/// The connection is behind an async mutex: the engine issues at most a
/// handful of statements per flush, so serialized access is plenty.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens a store at the given path, creating the schema if necessary.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store.
    ///
    /// Useful for testing. The data is destroyed when the store is dropped.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initializes the schema. Idempotent.
    fn init(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "
            -- One row per (user_id, date, session_id, course_id), with the
            -- optional identifiers part of the key including their NULL state.
            CREATE TABLE IF NOT EXISTS daily_activity (
                user_id TEXT NOT NULL,
                date TEXT NOT NULL,
                session_id TEXT,
                course_id TEXT,
                total_seconds INTEGER NOT NULL DEFAULT 0,
                active_seconds INTEGER NOT NULL DEFAULT 0,
                page_views INTEGER NOT NULL DEFAULT 0,
                last_activity_at TEXT NOT NULL
            );

            -- SQLite treats NULLs as distinct in unique indexes, so the
            -- optional key columns are coalesced to the empty string, which
            -- no validated identifier can collide with.
            CREATE UNIQUE INDEX IF NOT EXISTS idx_daily_activity_key
                ON daily_activity(user_id, date, COALESCE(session_id, ''), COALESCE(course_id, ''));

            CREATE INDEX IF NOT EXISTS idx_daily_activity_user_date
                ON daily_activity(user_id, date);
            ",
        )?;
        Ok(())
    }
}

#[async_trait]
impl DailyRecordStore for SqliteStore {
    async fn fetch(&self, key: &DailyRecordKey) -> Result<Option<DailyRecord>, StoreError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "
                SELECT total_seconds, active_seconds, page_views, last_activity_at
                FROM daily_activity
                WHERE user_id = ?1 AND date = ?2 AND session_id IS ?3 AND course_id IS ?4
                ",
                params![
                    key.user_id.as_str(),
                    format_date(key.date),
                    key.session_id.as_ref().map(|id| id.as_str()),
                    key.course_id.as_ref().map(|id| id.as_str()),
                ],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((total_seconds, active_seconds, page_views, last_activity_at)) = row else {
            return Ok(None);
        };
        Ok(Some(DailyRecord {
            key: key.clone(),
            total_seconds,
            active_seconds,
            page_views,
            last_activity_at: parse_timestamp(&last_activity_at)?,
        }))
    }

    async fn insert(&self, record: &DailyRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let result = conn.execute(
            "
            INSERT INTO daily_activity
            (user_id, date, session_id, course_id, total_seconds, active_seconds, page_views, last_activity_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
            params![
                record.key.user_id.as_str(),
                format_date(record.key.date),
                record.key.session_id.as_ref().map(|id| id.as_str()),
                record.key.course_id.as_ref().map(|id| id.as_str()),
                record.total_seconds,
                record.active_seconds,
                record.page_views,
                format_timestamp(record.last_activity_at),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => Err(StoreError::Duplicate {
                user_id: record.key.user_id.to_string(),
                date: record.key.date,
            }),
            Err(err) => Err(err.into()),
        }
    }

    async fn update(&self, record: &DailyRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "
            UPDATE daily_activity
            SET total_seconds = ?1, active_seconds = ?2, page_views = ?3, last_activity_at = ?4
            WHERE user_id = ?5 AND date = ?6 AND session_id IS ?7 AND course_id IS ?8
            ",
            params![
                record.total_seconds,
                record.active_seconds,
                record.page_views,
                format_timestamp(record.last_activity_at),
                record.key.user_id.as_str(),
                format_date(record.key.date),
                record.key.session_id.as_ref().map(|id| id.as_str()),
                record.key.course_id.as_ref().map(|id| id.as_str()),
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::MissingRecord {
                user_id: record.key.user_id.to_string(),
                date: record.key.date,
            });
        }
        Ok(())
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| StoreError::TimestampParse {
            value: value.to_string(),
            source,
        })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
