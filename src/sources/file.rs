use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::ScheduleSource;
use crate::models::ScheduleEntry;

/// Schedule entries read from `{ "<client>": [entry, ...] }`. The file is
/// re-read on every load so edits are picked up at the next refresh.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse(contents: &str) -> Result<Vec<ScheduleEntry>> {
        let by_client: BTreeMap<String, Vec<ScheduleEntry>> =
            serde_json::from_str(contents).context("invalid schedule file")?;

        Ok(by_client
            .into_iter()
            .flat_map(|(client, entries)| {
                entries.into_iter().map(move |mut entry| {
                    entry.client = client.clone();
                    entry
                })
            })
            .collect())
    }
}

#[async_trait]
impl ScheduleSource for JsonFileSource {
    async fn load_entries(&self) -> Result<Vec<ScheduleEntry>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read schedule file {}", self.path.display()))?;
        Self::parse(&contents).with_context(|| format!("in {}", self.path.display()))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
