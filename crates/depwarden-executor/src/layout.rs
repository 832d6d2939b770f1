use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOCKFILE_NAME: &str = "poetry.lock";
pub const DEFAULT_BACKUP_DIR: &str = "var/upgrade-backups";

const CHECKPOINT_JOURNAL_FILE: &str = "checkpoints.jsonl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
    lockfile_name: String,
    backup_dir: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let backup_dir = root.join(DEFAULT_BACKUP_DIR);
        Self {
            root,
            lockfile_name: DEFAULT_LOCKFILE_NAME.to_string(),
            backup_dir,
        }
    }

    pub fn with_lockfile_name(mut self, name: impl Into<String>) -> Self {
        self.lockfile_name = name.into();
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lockfile_name(&self) -> &str {
        &self.lockfile_name
    }

    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join(&self.lockfile_name)
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn checkpoint_journal_path(&self) -> PathBuf {
        self.backup_dir.join(CHECKPOINT_JOURNAL_FILE)
    }

    /// `poetry.lock.20240101_120000_000123`, with `-N` appended when an
    /// earlier backup already claimed the same instant.
    pub fn backup_path(&self, taken_at: &DateTime<Utc>, attempt: u32) -> PathBuf {
        let stamp = taken_at.format("%Y%m%d_%H%M%S_%6f");
        let file_name = if attempt == 0 {
            format!("{}.{stamp}", self.lockfile_name)
        } else {
            format!("{}.{stamp}-{attempt}", self.lockfile_name)
        };
        self.backup_dir.join(file_name)
    }

    pub fn restore_staging_path(&self) -> PathBuf {
        self.root.join(format!(".{}.restore", self.lockfile_name))
    }

    pub fn ensure_backup_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("failed to create {}", self.backup_dir.display()))
    }
}
