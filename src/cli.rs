//! Command-line frontend: the capture service plus schedule management
//! against the SQLite store.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::db::Database;
use crate::models::{parse_time_of_day, DaySet, ScheduleEntry};
use crate::settings::{ScheduleSourceConfig, Settings, CONFIG_ENV};

#[derive(Debug, Parser)]
#[command(name = "tabsense")]
#[command(about = "Shift-boundary camera captures and stain detection triggers")]
#[command(version)]
pub struct Cli {
    /// Settings file (JSON)
    #[arg(long, global = true, env = CONFIG_ENV, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the capture scheduler until ctrl-c (the default)
    Run,

    /// Manage schedule entries in the SQLite store
    Entry {
        #[command(subcommand)]
        command: EntryCommand,
    },

    /// List clients that have schedule entries
    Clients,
}

#[derive(Debug, Subcommand)]
pub enum EntryCommand {
    /// Add a schedule entry
    Add(EntryArgs),

    /// Replace an existing entry
    Update {
        /// Entry id
        #[arg(long)]
        id: i64,

        #[command(flatten)]
        entry: EntryArgs,
    },

    /// Delete one entry
    Delete {
        #[arg(long)]
        client: String,

        /// Entry id
        #[arg(long)]
        id: i64,
    },

    /// Delete every entry of a room
    DeleteRoom {
        #[arg(long)]
        client: String,

        #[arg(long)]
        room: String,
    },

    /// List entries, optionally for one client
    List {
        #[arg(long)]
        client: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct EntryArgs {
    #[arg(long)]
    pub client: String,

    #[arg(long)]
    pub room: String,

    #[arg(long, default_value = "")]
    pub label: String,

    /// Comma-separated sector numbers
    #[arg(long, value_delimiter = ',', required = true)]
    pub sectors: Vec<u32>,

    /// Shift start, HH:MM or HH:MM:SS
    #[arg(long, value_parser = time_arg)]
    pub start: NaiveTime,

    /// Shift end, HH:MM or HH:MM:SS
    #[arg(long, value_parser = time_arg)]
    pub end: NaiveTime,

    /// Comma-separated weekday names
    #[arg(long, value_delimiter = ',', required = true)]
    pub days: Vec<String>,
}

fn time_arg(value: &str) -> Result<NaiveTime, String> {
    parse_time_of_day(value).map_err(|err| err.to_string())
}

impl EntryArgs {
    pub fn to_entry(&self) -> Result<ScheduleEntry> {
        Ok(ScheduleEntry::new(
            self.client.clone(),
            self.room.clone(),
            self.label.clone(),
            self.sectors.clone(),
            self.start,
            self.end,
            DaySet::from_names(&self.days)?,
        ))
    }
}

/// Opens the store named by `settings`. Management commands only work
/// against SQLite.
pub fn open_store(settings: &Settings) -> Result<Database> {
    match &settings.schedule_source {
        ScheduleSourceConfig::Sqlite { path } => Database::new(path.clone())
            .with_context(|| format!("failed to open schedule store {}", path.display())),
        ScheduleSourceConfig::File { path } => bail!(
            "schedule entries come from {}; edit that file instead",
            path.display()
        ),
    }
}

fn print_json<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub async fn run_entry_command(
    command: EntryCommand,
    db: &Database,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        EntryCommand::Add(args) => {
            let stored = db.insert_entry(&args.to_entry()?).await?;
            print_json(out, &stored)
        }
        EntryCommand::Update { id, entry } => {
            let stored = db.update_entry(&entry.client, id, &entry.to_entry()?).await?;
            print_json(out, &stored)
        }
        EntryCommand::Delete { client, id } => {
            if !db.delete_entry(&client, id).await? {
                bail!("schedule entry {id} not found for client {client}");
            }
            writeln!(out, "Deleted entry {id}")?;
            Ok(())
        }
        EntryCommand::DeleteRoom { client, room } => {
            let removed = db.delete_room_entries(&client, &room).await?;
            writeln!(out, "Deleted {removed} entries for {client}/{room}")?;
            Ok(())
        }
        EntryCommand::List { client } => {
            let entries = match client {
                Some(client) => db.list_entries_for_client(&client).await?,
                None => db.list_entries().await?,
            };
            print_json(out, &entries)
        }
    }
}

pub async fn run_clients_command(db: &Database, out: &mut dyn Write) -> Result<()> {
    for client in db.list_clients().await? {
        writeln!(out, "{client}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("tabsense").chain(args.iter().copied())).unwrap()
    }

    fn entry_command(args: &[&str]) -> EntryCommand {
        match parse(args).command {
            Some(Command::Entry { command }) => command,
            other => panic!("expected an entry command, got {other:?}"),
        }
    }

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("tabsense.sqlite3")).unwrap();
        (dir, db)
    }

    async fn output_of(command: EntryCommand, db: &Database) -> String {
        let mut out = Vec::new();
        run_entry_command(command, db, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    const ADD: [&str; 14] = [
        "entry", "add", "--client", "acme", "--room", "R1", "--sectors", "1,2", "--start",
        "08:00", "--end", "17:00", "--days", "Monday,fri",
    ];

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = parse(&[]);
        assert!(cli.command.is_none());
        assert!(matches!(parse(&["run"]).command, Some(Command::Run)));
    }

    #[test]
    fn bad_time_is_a_usage_error() {
        let mut args = ADD.to_vec();
        args[11] = "25:00";
        let err = Cli::try_parse_from(std::iter::once("tabsense").chain(args)).unwrap_err();
        assert!(err.to_string().contains("25:00"), "{err}");
    }

    #[tokio::test]
    async fn add_then_list_shows_the_entry() {
        let (_dir, db) = open();
        let added: serde_json::Value =
            serde_json::from_str(&output_of(entry_command(&ADD), &db).await).unwrap();
        assert_eq!(added["client"], "acme");
        assert_eq!(added["sectors"], serde_json::json!([1, 2]));
        assert_eq!(added["days"], serde_json::json!(["Monday", "Friday"]));
        assert!(added["id"].is_i64());

        let listed: serde_json::Value =
            serde_json::from_str(&output_of(entry_command(&["entry", "list"]), &db).await).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], added["id"]);
        assert_eq!(listed[0]["start"], "08:00:00");
    }

    #[tokio::test]
    async fn update_and_delete_by_id() {
        let (_dir, db) = open();
        let stored = db.insert_entry(&acme_entry()).await.unwrap();
        let id = stored.id.to_string();

        let mut update = vec!["entry", "update", "--id", id.as_str()];
        update.extend_from_slice(&ADD[2..]);
        let end = update.iter().position(|arg| *arg == "--end").unwrap() + 1;
        update[end] = "18:00";
        let updated: serde_json::Value =
            serde_json::from_str(&output_of(entry_command(&update), &db).await).unwrap();
        assert_eq!(updated["end"], "18:00:00");
        assert_eq!(updated["id"].as_i64(), Some(stored.id));

        let deleted = output_of(
            entry_command(&["entry", "delete", "--client", "acme", "--id", id.as_str()]),
            &db,
        )
        .await;
        assert_eq!(deleted.trim(), format!("Deleted entry {id}"));
        assert!(db.list_entries().await.unwrap().is_empty());

        let mut out = Vec::new();
        let again = entry_command(&["entry", "delete", "--client", "acme", "--id", id.as_str()]);
        assert!(run_entry_command(again, &db, &mut out).await.is_err());
    }

    #[tokio::test]
    async fn delete_room_and_clients() {
        let (_dir, db) = open();
        run_entry_command(entry_command(&ADD), &db, &mut std::io::sink())
            .await
            .unwrap();
        let mut globex = ADD.to_vec();
        globex[3] = "globex";
        run_entry_command(entry_command(&globex), &db, &mut std::io::sink())
            .await
            .unwrap();

        let mut out = Vec::new();
        run_clients_command(&db, &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "acme\nglobex\n");

        let removed = output_of(
            entry_command(&["entry", "delete-room", "--client", "acme", "--room", "R1"]),
            &db,
        )
        .await;
        assert_eq!(removed.trim(), "Deleted 1 entries for acme/R1");
        assert_eq!(db.list_clients().await.unwrap(), vec!["globex"]);
    }

    #[test]
    fn file_sources_cannot_be_managed() {
        let settings = Settings {
            schedule_source: ScheduleSourceConfig::File {
                path: PathBuf::from("schedule.json"),
            },
            ..Settings::default()
        };
        assert!(open_store(&settings).is_err());
    }

    fn acme_entry() -> ScheduleEntry {
        match entry_command(&ADD) {
            EntryCommand::Add(args) => args.to_entry().unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }
}
