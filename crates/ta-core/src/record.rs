//! Persisted daily aggregate rows and the flush merge math.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{CourseId, SessionId, TrackingContext, UserId};

/// Counters drained from a [`LocalAccumulator`](crate::LocalAccumulator) for
/// one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushSnapshot {
    pub total_seconds: i64,
    pub active_seconds: i64,
    pub page_views: i64,
}

/// Key of a persisted daily record.
///
/// The optional identifiers participate in the key including their absent
/// state: a row with no session is distinct from any row with a concrete
/// session. `date` is the application-local calendar day at flush time - a
/// window spanning midnight is attributed entirely to the flush-time day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DailyRecordKey {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub session_id: Option<SessionId>,
    pub course_id: Option<CourseId>,
}

impl DailyRecordKey {
    /// Builds the key for flushing `context` on `date`.
    pub fn new(context: &TrackingContext, date: NaiveDate) -> Self {
        Self {
            user_id: context.user_id.clone(),
            date,
            session_id: context.session_id.clone(),
            course_id: context.course_id.clone(),
        }
    }
}

/// One persisted daily aggregate row.
///
/// Created on the first flush of a key on a given day, then read-add-written
/// by every subsequent flush. Never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    pub key: DailyRecordKey,
    pub total_seconds: i64,
    pub active_seconds: i64,
    pub page_views: i64,
    pub last_activity_at: DateTime<Utc>,
}

impl DailyRecord {
    /// Builds the insert row for a key with no existing record.
    pub const fn from_snapshot(
        key: DailyRecordKey,
        snapshot: &FlushSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            key,
            total_seconds: snapshot.total_seconds,
            active_seconds: snapshot.active_seconds,
            page_views: snapshot.page_views,
            last_activity_at: now,
        }
    }

    /// Returns this record with the snapshot's counters added and the
    /// activity timestamp overwritten.
    #[must_use]
    pub fn merged(&self, snapshot: &FlushSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            key: self.key.clone(),
            total_seconds: self.total_seconds + snapshot.total_seconds,
            active_seconds: self.active_seconds + snapshot.active_seconds,
            page_views: self.page_views + snapshot.page_views,
            last_activity_at: now,
        }
    }
}
