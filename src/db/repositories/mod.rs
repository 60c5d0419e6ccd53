pub mod schedule_entries;
