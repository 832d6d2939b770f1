use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeResult {
    pub package: String,
    pub success: bool,
    pub previous_version: Option<String>,
    pub new_version: Option<String>,
    pub duration_s: f64,
    pub error_message: Option<String>,
}

/// A lockfile snapshot taken during a run. `success` tells whether the state
/// it captures is trustworthy: for the initial snapshot, whether the backup
/// was written; for a batch snapshot, whether the batch passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeCheckpoint {
    pub timestamp: DateTime<Utc>,
    pub packages_upgraded: Vec<String>,
    pub lock_file_backup: Option<PathBuf>,
    pub lock_file_sha256: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Success,
    Partial,
    Failed,
    RolledBack,
}

impl FinalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    pub fn derive(rollback_performed: bool, successful: usize, total: usize) -> Self {
        if rollback_performed {
            Self::RolledBack
        } else if successful == total {
            Self::Success
        } else if successful > 0 {
            Self::Partial
        } else {
            Self::Failed
        }
    }
}

impl std::fmt::Display for FinalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeSummary {
    pub requested: usize,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub batches: usize,
    pub checkpoints: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoUpgradeReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub upgrades: Vec<UpgradeResult>,
    pub checkpoints: Vec<UpgradeCheckpoint>,
    pub rollback_performed: bool,
    pub final_status: FinalStatus,
    pub summary: UpgradeSummary,
}

impl AutoUpgradeReport {
    pub fn result_for(&self, package: &str) -> Option<&UpgradeResult> {
        self.upgrades.iter().find(|result| result.package == package)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &UpgradeResult> {
        self.upgrades.iter().filter(|result| result.success)
    }
}
