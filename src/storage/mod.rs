//! File-based storage for validated items.
//!
//! Items are grouped by subject and written as pretty-printed JSON to
//! `<base>/<subject>/<job_id>_<unix_ts>.json`. Each file carries the job
//! context next to the items so a saved batch can be traced back to the
//! run that produced it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use examforge::storage::ItemStore;
//!
//! let store = ItemStore::new("questions");
//! let written = store.save(&outcome.ctx, &outcome.items).await?;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::exam::{Item, JobContext, Subject};

/// Default base directory for saved items.
pub const DEFAULT_OUTPUT_DIR: &str = "questions";

#[derive(Serialize)]
struct SavedBatch<'a> {
    ctx: &'a JobContext,
    items: Vec<&'a Item>,
}

/// Writes validated items to disk.
#[derive(Debug, Clone)]
pub struct ItemStore {
    base_path: PathBuf,
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_DIR)
    }
}

impl ItemStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding files for `subject`.
    pub fn subject_dir(&self, subject: Subject) -> PathBuf {
        self.base_path.join(subject.as_str())
    }

    /// Ensures the base directory and one directory per subject exist.
    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        for subject in Subject::ALL {
            fs::create_dir_all(self.subject_dir(subject)).await?;
        }
        Ok(())
    }

    /// Saves `items` grouped by subject, one file per subject present.
    ///
    /// Returns the written paths in subject order. An empty slice writes
    /// nothing.
    pub async fn save(
        &self,
        ctx: &JobContext,
        items: &[Item],
    ) -> Result<Vec<PathBuf>, StorageError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure_dirs().await?;

        let mut by_subject: BTreeMap<Subject, Vec<&Item>> = BTreeMap::new();
        for item in items {
            by_subject.entry(item.subject).or_default().push(item);
        }

        let timestamp = Utc::now().timestamp();
        let mut written = Vec::with_capacity(by_subject.len());
        for (subject, group) in by_subject {
            let path = self
                .subject_dir(subject)
                .join(format!("{}_{}.json", ctx.job_id, timestamp));
            let count = group.len();
            let body = serde_json::to_string_pretty(&SavedBatch { ctx, items: group })?;
            fs::write(&path, body).await?;
            debug!(path = %path.display(), subject = %subject, count, "Saved items");
            written.push(path);
        }

        info!(job_id = %ctx.job_id, files = written.len(), "Items saved");
        Ok(written)
    }
}
