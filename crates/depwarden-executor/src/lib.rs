mod checkpoints;
mod executor;
mod layout;
mod package_manager;
mod report;

pub use checkpoints::{
    append_checkpoint_journal, create_checkpoint, lockfile_sha256, read_checkpoint_journal,
    restore_lockfile, CheckpointKind, RollbackError,
};
pub use executor::{ExecutorOptions, SafeUpgradeExecutor, DEFAULT_MAX_BATCH_SIZE};
pub use layout::{ProjectLayout, DEFAULT_BACKUP_DIR, DEFAULT_LOCKFILE_NAME};
pub use package_manager::{
    parse_show_version, CliPackageManager, CommandFailure, CommandTimeouts, PackageManager,
    DEFAULT_PROGRAM,
};
pub use report::{
    AutoUpgradeReport, FinalStatus, UpgradeCheckpoint, UpgradeResult, UpgradeSummary,
};

#[cfg(test)]
mod tests;
