use std::time::Instant;

use chrono::Utc;
use depwarden_core::UpgradeCandidate;
use depwarden_policy::PolicyEngine;
use tracing::{error, info, warn};

use crate::checkpoints::{create_checkpoint, restore_lockfile, CheckpointKind, RollbackError};
use crate::{
    AutoUpgradeReport, CommandFailure, FinalStatus, PackageManager, ProjectLayout,
    UpgradeCheckpoint, UpgradeResult, UpgradeSummary,
};

pub const DEFAULT_MAX_BATCH_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorOptions {
    pub max_batch_size: usize,
    pub enable_health_checks: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            enable_health_checks: true,
        }
    }
}

/// Applies upgrade candidates in batches, checkpointing the lockfile around
/// every batch and restoring the pre-run lockfile when a batch fails.
///
/// Runs are strictly sequential. Nothing guards against two executors
/// working on the same project at once.
#[derive(Debug)]
pub struct SafeUpgradeExecutor<P> {
    layout: ProjectLayout,
    package_manager: P,
    options: ExecutorOptions,
}

impl<P: PackageManager> SafeUpgradeExecutor<P> {
    pub fn new(layout: ProjectLayout, package_manager: P, options: ExecutorOptions) -> Self {
        Self {
            layout,
            package_manager,
            options: ExecutorOptions {
                max_batch_size: options.max_batch_size.max(1),
                ..options
            },
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn package_manager(&self) -> &P {
        &self.package_manager
    }

    pub fn options(&self) -> &ExecutorOptions {
        &self.options
    }

    pub fn execute_upgrades(
        &self,
        candidates: &[UpgradeCandidate],
        auto_rollback: bool,
    ) -> AutoUpgradeReport {
        self.run(candidates, auto_rollback)
    }

    /// Same as [`Self::execute_upgrades`], then records every upgrade that
    /// stuck in `engine` so later cadence checks see it.
    pub fn execute_upgrades_with_policy(
        &self,
        candidates: &[UpgradeCandidate],
        auto_rollback: bool,
        engine: &mut PolicyEngine,
    ) -> AutoUpgradeReport {
        let report = self.run(candidates, auto_rollback);
        if !report.rollback_performed {
            for result in report.succeeded() {
                engine.record_upgrade_at(&result.package, report.completed_at);
            }
        }
        report
    }

    pub fn create_batches<'a>(
        &self,
        candidates: &'a [UpgradeCandidate],
    ) -> Vec<&'a [UpgradeCandidate]> {
        candidates.chunks(self.options.max_batch_size).collect()
    }

    fn run(&self, candidates: &[UpgradeCandidate], auto_rollback: bool) -> AutoUpgradeReport {
        let started_at = Utc::now();
        info!(
            "Starting upgrade of {} package(s) in {}",
            candidates.len(),
            self.layout.root().display()
        );

        let mut checkpoints = vec![create_checkpoint(
            &self.layout,
            CheckpointKind::Initial,
            Vec::new(),
        )];
        let mut upgrades: Vec<UpgradeResult> = Vec::new();
        let mut rollback_performed = false;

        let batches = self.create_batches(candidates);
        for (index, batch) in batches.iter().enumerate() {
            info!(
                "Processing batch {}/{} ({} package(s))",
                index + 1,
                batches.len(),
                batch.len()
            );

            let batch_start = upgrades.len();
            let mut touched = Vec::with_capacity(batch.len());
            let mut batch_success = true;

            for candidate in batch.iter() {
                touched.push(candidate.package.clone());
                let result = self.upgrade_single_package(candidate);
                let succeeded = result.success;
                upgrades.push(result);
                if !succeeded {
                    error!("Upgrade of {} failed", candidate.package);
                    batch_success = false;
                    break;
                }
            }

            if batch_success && self.options.enable_health_checks {
                if let Err(failure) = self.package_manager.check() {
                    error!("Health check failed after batch {}: {failure}", index + 1);
                    batch_success = false;
                    let message = format!("Health check failed after upgrade: {failure}");
                    for result in &mut upgrades[batch_start..] {
                        result.success = false;
                        result.error_message = Some(message.clone());
                    }
                }
            }

            checkpoints.push(create_checkpoint(
                &self.layout,
                CheckpointKind::Batch {
                    success: batch_success,
                },
                touched,
            ));

            if !batch_success {
                warn!("Batch {} failed; remaining batches skipped", index + 1);
                if auto_rollback {
                    info!("Initiating automatic rollback");
                    match self.rollback_to(&checkpoints[0]) {
                        Ok(()) => info!("Rollback successful"),
                        Err(RollbackError::Reinstall(failure)) => {
                            error!("Lockfile restored but environment resync failed: {failure}")
                        }
                        Err(err) => error!("Rollback failed: {err}"),
                    }
                    rollback_performed = true;
                }
                break;
            }
        }

        let successful = upgrades.iter().filter(|result| result.success).count();
        let summary = UpgradeSummary {
            requested: candidates.len(),
            total: upgrades.len(),
            successful,
            failed: upgrades.len() - successful,
            batches: batches.len(),
            checkpoints: checkpoints.len(),
        };
        let final_status = FinalStatus::derive(rollback_performed, successful, upgrades.len());
        info!(
            "Upgrade run finished: {final_status} ({successful}/{} succeeded)",
            upgrades.len()
        );

        AutoUpgradeReport {
            started_at,
            completed_at: Utc::now(),
            upgrades,
            checkpoints,
            rollback_performed,
            final_status,
            summary,
        }
    }

    fn upgrade_single_package(&self, candidate: &UpgradeCandidate) -> UpgradeResult {
        let started = Instant::now();
        let package = candidate.package.as_str();
        let previous_version = self.package_manager.installed_version(package);
        info!("Upgrading {candidate}");

        let outcome = self
            .package_manager
            .upgrade(package, candidate.target_version.as_deref());
        let (success, new_version, error_message) = match outcome {
            Ok(()) => (true, self.package_manager.installed_version(package), None),
            Err(failure) => (false, None, Some(describe_failure(&failure))),
        };

        UpgradeResult {
            package: package.to_string(),
            success,
            previous_version,
            new_version,
            duration_s: started.elapsed().as_secs_f64(),
            error_message,
        }
    }

    /// Restores the lockfile from `checkpoint` and resyncs the environment.
    pub fn rollback_to(&self, checkpoint: &UpgradeCheckpoint) -> Result<(), RollbackError> {
        restore_lockfile(&self.layout, checkpoint)?;
        info!("Lockfile restored from checkpoint");
        self.package_manager
            .reinstall()
            .map_err(RollbackError::Reinstall)
    }
}

fn describe_failure(failure: &CommandFailure) -> String {
    match failure {
        CommandFailure::Exited { stderr, .. } if !stderr.is_empty() => stderr.clone(),
        other => other.to_string(),
    }
}
