//! Where schedule entries come from: the SQLite store, or a JSON file
//! keyed by tenant.

mod file;

use anyhow::Result;
use async_trait::async_trait;

use crate::db::Database;
use crate::models::ScheduleEntry;

pub use file::JsonFileSource;

#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn load_entries(&self) -> Result<Vec<ScheduleEntry>>;

    fn describe(&self) -> String;
}

/// Keeps the entries whose client is in `clients`. `None` keeps everything.
pub fn retain_clients(entries: &mut Vec<ScheduleEntry>, clients: Option<&[String]>) {
    if let Some(clients) = clients {
        entries.retain(|entry| clients.iter().any(|client| client == &entry.client));
    }
}

#[async_trait]
impl ScheduleSource for Database {
    async fn load_entries(&self) -> Result<Vec<ScheduleEntry>> {
        Ok(self
            .list_entries()
            .await?
            .into_iter()
            .map(|stored| stored.entry)
            .collect())
    }

    fn describe(&self) -> String {
        format!("sqlite {}", self.path().display())
    }
}
