use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::ScheduleEntry;

/// A schedule entry row, with the store's id and bookkeeping columns.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEntry {
    pub id: i64,
    #[serde(flatten)]
    pub entry: ScheduleEntry,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
