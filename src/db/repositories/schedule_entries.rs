use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, Row};

use crate::db::{
    helpers::{
        days_from_json, days_to_json, format_time, parse_datetime, parse_time, sectors_from_json,
        sectors_to_json,
    },
    models::StoredEntry,
    Database,
};
use crate::models::{dedup_sectors, ScheduleEntry};

const SELECT_ENTRY: &str = "SELECT id, client, room, label, sectors_json, start_time, end_time, \
     days_json, created_at, updated_at FROM schedule_entries";

fn row_to_entry(row: &Row) -> Result<StoredEntry> {
    let sectors: String = row.get("sectors_json")?;
    let start: String = row.get("start_time")?;
    let end: String = row.get("end_time")?;
    let days: String = row.get("days_json")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let id: i64 = row.get("id")?;

    Ok(StoredEntry {
        id,
        entry: ScheduleEntry {
            store_id: Some(id),
            client: row.get("client")?,
            room: row.get("room")?,
            label: row.get("label")?,
            sectors: dedup_sectors(sectors_from_json(&sectors)?),
            start: parse_time(&start, "start_time")?,
            end: parse_time(&end, "end_time")?,
            days: days_from_json(&days)?,
        },
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn fetch_entry(conn: &Connection, id: i64) -> Result<Option<StoredEntry>> {
    let mut stmt = conn.prepare(&format!("{SELECT_ENTRY} WHERE id = ?1"))?;
    let mut rows = stmt.query(params![id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_entry(row)?)),
        None => Ok(None),
    }
}

fn collect_entries(conn: &Connection, filter: &str, client: Option<&str>) -> Result<Vec<StoredEntry>> {
    let sql = format!("{SELECT_ENTRY} {filter} ORDER BY client, room, start_time, id");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = match client {
        Some(client) => stmt.query(params![client])?,
        None => stmt.query([])?,
    };

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        entries.push(row_to_entry(row)?);
    }
    Ok(entries)
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

fn validate(entry: &ScheduleEntry) -> Result<()> {
    if entry.client.trim().is_empty() {
        bail!("schedule entry for room {} has no client", entry.room);
    }
    if entry.room.trim().is_empty() {
        bail!("schedule entry for client {} has no room", entry.client);
    }
    Ok(())
}

impl Database {
    /// Stores a new entry. An entry with the same client, room, start and
    /// end already present is rejected.
    pub async fn insert_entry(&self, entry: &ScheduleEntry) -> Result<StoredEntry> {
        validate(entry)?;
        let entry = entry.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let inserted = conn.execute(
                "INSERT INTO schedule_entries
                    (client, room, label, sectors_json, start_time, end_time, days_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.client,
                    entry.room,
                    entry.label,
                    sectors_to_json(&entry.sectors)?,
                    format_time(entry.start),
                    format_time(entry.end),
                    days_to_json(&entry.days)?,
                    now,
                    now,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    bail!("schedule entry {} already exists", entry.key())
                }
                Err(err) => return Err(err).context("failed to insert schedule entry"),
            }

            let id = conn.last_insert_rowid();
            fetch_entry(conn, id)?.ok_or_else(|| anyhow!("schedule entry {id} not found after insert"))
        })
        .await
    }

    /// Replaces the entry `id` owned by `client`.
    pub async fn update_entry(
        &self,
        client: &str,
        id: i64,
        entry: &ScheduleEntry,
    ) -> Result<StoredEntry> {
        let mut entry = entry.clone();
        entry.client = client.to_string();
        validate(&entry)?;
        self.execute(move |conn| {
            let updated = conn.execute(
                "UPDATE schedule_entries
                 SET room = ?1,
                     label = ?2,
                     sectors_json = ?3,
                     start_time = ?4,
                     end_time = ?5,
                     days_json = ?6,
                     updated_at = ?7
                 WHERE id = ?8 AND client = ?9",
                params![
                    entry.room,
                    entry.label,
                    sectors_to_json(&entry.sectors)?,
                    format_time(entry.start),
                    format_time(entry.end),
                    days_to_json(&entry.days)?,
                    Utc::now().to_rfc3339(),
                    id,
                    entry.client,
                ],
            );
            match updated {
                Ok(0) => bail!("schedule entry {id} not found for client {}", entry.client),
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    bail!("schedule entry {} already exists", entry.key())
                }
                Err(err) => return Err(err).context("failed to update schedule entry"),
            }

            fetch_entry(conn, id)?.ok_or_else(|| anyhow!("schedule entry {id} not found after update"))
        })
        .await
    }

    /// Deletes one entry. Returns whether a row was removed.
    pub async fn delete_entry(&self, client: &str, id: i64) -> Result<bool> {
        let client = client.to_string();
        self.execute(move |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM schedule_entries WHERE id = ?1 AND client = ?2",
                    params![id, client],
                )
                .context("failed to delete schedule entry")?;
            Ok(removed > 0)
        })
        .await
    }

    /// Deletes every entry for one room.
    pub async fn delete_room_entries(&self, client: &str, room: &str) -> Result<usize> {
        let client = client.to_string();
        let room = room.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM schedule_entries WHERE client = ?1 AND room = ?2",
                params![client, room],
            )
            .context("failed to delete room entries")
        })
        .await
    }

    pub async fn list_entries(&self) -> Result<Vec<StoredEntry>> {
        self.execute(|conn| collect_entries(conn, "", None)).await
    }

    pub async fn list_entries_for_client(&self, client: &str) -> Result<Vec<StoredEntry>> {
        let client = client.to_string();
        self.execute(move |conn| collect_entries(conn, "WHERE client = ?1", Some(client.as_str())))
            .await
    }

    pub async fn list_clients(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT client FROM schedule_entries ORDER BY client")?;
            let clients = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(clients)
        })
        .await
    }
}
