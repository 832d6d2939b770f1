use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::{CommandFailure, ProjectLayout, UpgradeCheckpoint};

const MAX_BACKUP_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    /// Taken before any package is touched. Its success flag records whether
    /// the lockfile backup was written.
    Initial,
    /// Taken after a batch; carries the batch outcome.
    Batch { success: bool },
}

#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("checkpoint has no lockfile backup to restore")]
    NoBackup,
    #[error("lockfile backup {} is unreadable: {source}", .path.display())]
    BackupUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("lockfile backup {} does not match its recorded digest", .path.display())]
    DigestMismatch { path: PathBuf },
    #[error("failed to restore lockfile {}: {source}", .path.display())]
    Restore {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("dependency reinstall failed: {0}")]
    Reinstall(#[source] CommandFailure),
}

/// Backs up the current lockfile and records the checkpoint in the journal.
/// Backup and journal failures are logged and never abort the run.
pub fn create_checkpoint(
    layout: &ProjectLayout,
    kind: CheckpointKind,
    packages_upgraded: Vec<String>,
) -> UpgradeCheckpoint {
    let timestamp = Utc::now();
    let backup = match backup_lockfile(layout, &timestamp) {
        Ok(Some(backup)) => Some(backup),
        Ok(None) => {
            warn!(
                "No lockfile at {}; checkpoint has no backup",
                layout.lockfile_path().display()
            );
            None
        }
        Err(err) => {
            warn!("Failed to back up lockfile: {err:#}");
            None
        }
    };

    let success = match kind {
        CheckpointKind::Initial => backup.is_some(),
        CheckpointKind::Batch { success } => success,
    };
    let (lock_file_backup, lock_file_sha256) = match backup {
        Some((path, digest)) => (Some(path), Some(digest)),
        None => (None, None),
    };

    let checkpoint = UpgradeCheckpoint {
        timestamp,
        packages_upgraded,
        lock_file_backup,
        lock_file_sha256,
        success,
    };

    match &checkpoint.lock_file_backup {
        Some(path) => info!("Checkpoint created: {}", path.display()),
        None => info!("Checkpoint created without lockfile backup"),
    }
    if let Err(err) = append_checkpoint_journal(layout, &checkpoint) {
        warn!("Failed to record checkpoint in journal: {err:#}");
    }

    checkpoint
}

fn backup_lockfile(
    layout: &ProjectLayout,
    taken_at: &DateTime<Utc>,
) -> Result<Option<(PathBuf, String)>> {
    let lockfile = layout.lockfile_path();
    let bytes = match fs::read(&lockfile) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read lockfile: {}", lockfile.display()));
        }
    };
    layout.ensure_backup_dir()?;

    for attempt in 0..MAX_BACKUP_NAME_ATTEMPTS {
        let path = layout.backup_path(taken_at, attempt);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to create backup: {}", path.display()));
            }
        };
        file.write_all(&bytes)
            .with_context(|| format!("failed to write backup: {}", path.display()))?;
        file.flush()
            .with_context(|| format!("failed to flush backup: {}", path.display()))?;
        return Ok(Some((path, lockfile_sha256(&bytes))));
    }

    Err(anyhow!(
        "no free backup file name left in {}",
        layout.backup_dir().display()
    ))
}

pub fn lockfile_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Puts the checkpoint's backup bytes back in place of the lockfile. The
/// backup is verified against its recorded digest first and swapped in via
/// a staging file so a failed write never leaves a truncated lockfile.
pub fn restore_lockfile(
    layout: &ProjectLayout,
    checkpoint: &UpgradeCheckpoint,
) -> Result<(), RollbackError> {
    let backup = checkpoint
        .lock_file_backup
        .as_ref()
        .ok_or(RollbackError::NoBackup)?;
    let bytes = fs::read(backup).map_err(|source| RollbackError::BackupUnreadable {
        path: backup.clone(),
        source,
    })?;
    if let Some(expected) = &checkpoint.lock_file_sha256 {
        if !lockfile_sha256(&bytes).eq_ignore_ascii_case(expected) {
            return Err(RollbackError::DigestMismatch {
                path: backup.clone(),
            });
        }
    }

    let target = layout.lockfile_path();
    let staging = layout.restore_staging_path();
    let restore_failed = |source| RollbackError::Restore {
        path: target.clone(),
        source,
    };
    fs::write(&staging, &bytes).map_err(restore_failed)?;
    if let Err(source) = fs::rename(&staging, &target) {
        let _ = fs::remove_file(&staging);
        return Err(restore_failed(source));
    }
    Ok(())
}

pub fn append_checkpoint_journal(
    layout: &ProjectLayout,
    checkpoint: &UpgradeCheckpoint,
) -> Result<PathBuf> {
    let path = layout.checkpoint_journal_path();
    layout.ensure_backup_dir()?;

    let line = serde_json::to_string(checkpoint).context("failed to serialize checkpoint")?;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open checkpoint journal: {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("failed to append checkpoint journal: {}", path.display()))?;
    file.write_all(b"\n").with_context(|| {
        format!(
            "failed to append checkpoint journal newline: {}",
            path.display()
        )
    })?;
    file.flush()
        .with_context(|| format!("failed to flush checkpoint journal: {}", path.display()))?;
    Ok(path)
}

pub fn read_checkpoint_journal(layout: &ProjectLayout) -> Result<Vec<UpgradeCheckpoint>> {
    let path = layout.checkpoint_journal_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read checkpoint journal: {}", path.display()));
        }
    };

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line).with_context(|| {
                format!(
                    "invalid checkpoint journal entry at {}:{}",
                    path.display(),
                    index + 1
                )
            })
        })
        .collect()
}
