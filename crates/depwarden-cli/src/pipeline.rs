use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use depwarden_core::{DependencyDeclarations, LockData, UpgradeCandidate};
use depwarden_executor::{AutoUpgradeReport, PackageManager, SafeUpgradeExecutor};
use depwarden_policy::{PolicyEngine, ScreeningOutcome};
use depwarden_resolver::{ConflictAnalysisReport, ConflictResolver};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub(crate) const PYPROJECT_FILE: &str = "pyproject.toml";

pub(crate) fn load_declarations(path: &Path) -> Result<DependencyDeclarations> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read dependency declarations: {}", path.display()))?;
    let is_pyproject = path
        .file_name()
        .is_some_and(|name| name == PYPROJECT_FILE);
    let parsed = if is_pyproject {
        DependencyDeclarations::from_pyproject_str(&raw)
    } else {
        DependencyDeclarations::from_toml_str(&raw)
    };
    parsed.with_context(|| format!("invalid dependency declarations: {}", path.display()))
}

pub(crate) fn load_lock_data(path: &Path) -> Result<Option<LockData>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read lockfile: {}", path.display()));
        }
    };
    LockData::from_toml_str(&raw)
        .map(Some)
        .with_context(|| format!("invalid lockfile: {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HeldBack {
    pub package: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct UpgradePlan {
    pub screening: ScreeningOutcome,
    pub conflicts: ConflictAnalysisReport,
    pub held_back: Vec<HeldBack>,
    pub approved: Vec<UpgradeCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PipelineReport {
    #[serde(flatten)]
    pub plan: UpgradePlan,
    pub execution: Option<AutoUpgradeReport>,
}

/// Screens candidates against policy, then holds back any approved
/// candidate whose target conflicts with a locked requirement. A target that
/// only disagrees with the project's own declaration goes ahead.
/// Current versions come from the lockfile.
pub(crate) fn plan_upgrades(
    engine: &PolicyEngine,
    resolver: &ConflictResolver,
    declarations: &DependencyDeclarations,
    lock: Option<&LockData>,
    candidates: &[UpgradeCandidate],
) -> UpgradePlan {
    let screening = engine.screen(candidates, |package| {
        lock.and_then(|lock| lock.locked_version(package))
            .map(str::to_string)
    });
    for evaluation in &screening.blocked {
        for violation in evaluation.violations.iter().filter(|v| v.is_blocking()) {
            warn!(
                "Policy blocked {}: {}",
                evaluation.candidate, violation.message
            );
        }
    }

    let screened = screening.approved_candidates();
    let conflicts = resolver.analyze_with_candidates(declarations, lock, &screened);

    let mut held_back = Vec::new();
    let mut approved = Vec::new();
    for candidate in screened {
        match candidate_conflict(&conflicts, &candidate) {
            Some(reason) => {
                warn!("Holding back {candidate}: {reason}");
                held_back.push(HeldBack {
                    package: candidate.package,
                    reason,
                });
            }
            None => approved.push(candidate),
        }
    }

    info!(
        "{} candidate(s) approved, {} blocked by policy, {} held back by conflicts",
        approved.len(),
        screening.blocked.len(),
        held_back.len()
    );

    UpgradePlan {
        screening,
        conflicts,
        held_back,
        approved,
    }
}

fn candidate_conflict(
    report: &ConflictAnalysisReport,
    candidate: &UpgradeCandidate,
) -> Option<String> {
    let conflict = report.conflict_for(&candidate.package)?;
    let target = conflict.candidate_constraint()?;
    let blockers = conflict.candidate_blockers();
    if blockers.is_empty() {
        return None;
    }

    let blockers = blockers
        .iter()
        .map(|constraint| format!("{} ({})", constraint.constraint, constraint.required_by))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("{} conflicts with {blockers}", target.constraint))
}

pub(crate) fn run_upgrade_pipeline<P: PackageManager>(
    engine: &mut PolicyEngine,
    plan: UpgradePlan,
    executor: &SafeUpgradeExecutor<P>,
    auto_rollback: bool,
) -> PipelineReport {
    if plan.approved.is_empty() {
        info!("No upgrade candidates left to execute");
        return PipelineReport {
            plan,
            execution: None,
        };
    }

    let execution = executor.execute_upgrades_with_policy(&plan.approved, auto_rollback, engine);
    PipelineReport {
        plan,
        execution: Some(execution),
    }
}
