//! Persisted request history
//!
//! One JSON snapshot `{requests, draft}` holding the most recent requests.
//! Writes go to a sibling temp file and are renamed into place. A missing,
//! empty or corrupt file loads as an empty snapshot, and unreadable records
//! are skipped one by one. A file that does not parse at all is never
//! overwritten.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::request::{SamplingDraft, SamplingRequest};
use crate::constants::history as history_constants;
use crate::types::{Result, ResultExt, SamplingError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistorySnapshot {
    /// Newest first
    pub requests: Vec<SamplingRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<SamplingDraft>,
}

/// Snapshot with records left as raw JSON so each parses on its own
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSnapshot {
    requests: Vec<serde_json::Value>,
    draft: Option<serde_json::Value>,
}

enum LoadState {
    Missing,
    Parsed {
        snapshot: HistorySnapshot,
        /// Records dropped because they did not parse
        skipped: usize,
    },
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    max_persisted: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_persisted: history_constants::MAX_PERSISTED,
        }
    }

    pub fn with_max_persisted(mut self, max_persisted: usize) -> Self {
        self.max_persisted = max_persisted;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, tolerating missing or unreadable content.
    ///
    /// Records that fail to parse are skipped individually; the rest load.
    pub async fn load(&self) -> HistorySnapshot {
        match self.read().await {
            LoadState::Missing => HistorySnapshot::default(),
            LoadState::Parsed { snapshot, .. } => snapshot,
            LoadState::Corrupt(_) => HistorySnapshot::default(),
        }
    }

    async fn read(&self) -> LoadState {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No history file yet");
                return LoadState::Missing;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read history, starting empty");
                return LoadState::Corrupt(e.to_string());
            }
        };

        if content.trim().is_empty() {
            return LoadState::Missing;
        }

        let raw = match serde_json::from_str::<RawSnapshot>(&content) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Corrupt history file, starting empty");
                return LoadState::Corrupt(e.to_string());
            }
        };

        let mut skipped = 0;
        let mut requests = Vec::with_capacity(raw.requests.len());
        for (index, value) in raw.requests.into_iter().enumerate() {
            match serde_json::from_value::<SamplingRequest>(value) {
                Ok(request) => requests.push(request),
                Err(e) => {
                    skipped += 1;
                    warn!(path = %self.path.display(), index, error = %e, "Skipping unreadable history record");
                }
            }
        }
        requests.truncate(self.max_persisted);

        let draft = raw
            .draft
            .and_then(|value| match serde_json::from_value::<SamplingDraft>(value) {
                Ok(draft) => Some(draft),
                Err(e) => {
                    skipped += 1;
                    warn!(path = %self.path.display(), error = %e, "Skipping unreadable saved draft");
                    None
                }
            });

        debug!(
            path = %self.path.display(),
            requests = requests.len(),
            skipped,
            "Loaded history"
        );
        LoadState::Parsed {
            snapshot: HistorySnapshot { requests, draft },
            skipped,
        }
    }

    /// Write the snapshot atomically, keeping at most `max_persisted` requests
    pub async fn save(&self, snapshot: &HistorySnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut snapshot = snapshot.clone();
        snapshot.requests.truncate(self.max_persisted);
        let content = serde_json::to_string_pretty(&snapshot)?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .with_context(format!("writing {}", tmp_path.display()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .with_context(format!("replacing {}", self.path.display()))?;

        info!(
            path = %self.path.display(),
            requests = snapshot.requests.len(),
            bytes = content.len(),
            "Saved history"
        );
        Ok(())
    }

    /// Put `recent` (newest first) ahead of older persisted requests and save.
    /// Requests present in both keep the in-memory version.
    pub async fn merge_and_save(
        &self,
        recent: Vec<SamplingRequest>,
        draft: Option<SamplingDraft>,
    ) -> Result<HistorySnapshot> {
        let previous = match self.read().await {
            LoadState::Missing => HistorySnapshot::default(),
            LoadState::Parsed { snapshot, skipped } => {
                if skipped > 0 {
                    self.backup().await?;
                }
                snapshot
            }
            LoadState::Corrupt(reason) => {
                return Err(SamplingError::Storage(format!(
                    "refusing to overwrite unreadable history {}: {}",
                    self.path.display(),
                    reason
                )));
            }
        };
        let seen: HashSet<_> = recent.iter().map(|r| r.id.clone()).collect();

        let mut requests = recent;
        requests.extend(
            previous
                .requests
                .into_iter()
                .filter(|r| !seen.contains(&r.id)),
        );
        requests.truncate(self.max_persisted);

        let snapshot = HistorySnapshot { requests, draft };
        self.save(&snapshot).await?;
        Ok(snapshot)
    }

    /// Copy the current file aside before records it holds get dropped
    async fn backup(&self) -> Result<PathBuf> {
        let backup_path = self.path.with_extension("json.bak");
        tokio::fs::copy(&self.path, &backup_path)
            .await
            .with_context(format!("backing up {}", self.path.display()))?;
        warn!(
            path = %self.path.display(),
            backup = %backup_path.display(),
            "History had unreadable records, original kept as backup"
        );
        Ok(backup_path)
    }

    /// Remove the snapshot file; returns whether one existed
    pub async fn clear(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Cleared history");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
