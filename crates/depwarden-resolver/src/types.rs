use chrono::{DateTime, Utc};
use depwarden_core::Severity;
use serde::{Deserialize, Serialize};

use crate::constraints::{leading_major_version, CANDIDATE_REQUIRER};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConstraint {
    pub package: String,
    pub constraint: String,
    pub required_by: String,
    pub is_direct: bool,
}

impl DependencyConstraint {
    pub fn direct(package: &str, constraint: &str, required_by: &str) -> Self {
        Self {
            package: package.to_string(),
            constraint: constraint.to_string(),
            required_by: required_by.to_string(),
            is_direct: true,
        }
    }

    pub fn transitive(package: &str, constraint: &str, required_by: &str) -> Self {
        Self {
            is_direct: false,
            ..Self::direct(package, constraint, required_by)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    Version,
    Missing,
    Circular,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub package: String,
    pub conflicting_constraints: Vec<DependencyConstraint>,
    pub conflict_type: ConflictType,
    pub severity: Severity,
    pub resolution_suggestions: Vec<String>,
    pub auto_resolvable: bool,
}

impl ConflictInfo {
    pub fn direct_constraints(&self) -> impl Iterator<Item = &DependencyConstraint> {
        self.conflicting_constraints.iter().filter(|c| c.is_direct)
    }

    pub fn candidate_constraint(&self) -> Option<&DependencyConstraint> {
        self.conflicting_constraints
            .iter()
            .find(|c| c.required_by == CANDIDATE_REQUIRER)
    }

    /// Locked requirements that anchor on a different major version than the
    /// upgrade candidate. Direct declarations are left out because adding the
    /// package at its target version rewrites them.
    pub fn candidate_blockers(&self) -> Vec<&DependencyConstraint> {
        let Some(target_major) = self
            .candidate_constraint()
            .and_then(|c| leading_major_version(&c.constraint))
        else {
            return Vec::new();
        };

        self.conflicting_constraints
            .iter()
            .filter(|c| !c.is_direct && c.required_by != CANDIDATE_REQUIRER)
            .filter(|c| {
                leading_major_version(&c.constraint).is_some_and(|major| major != target_major)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionType {
    Pin,
    Upgrade,
    Downgrade,
    Remove,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub package: String,
    pub resolution_type: ResolutionType,
    pub target_version: Option<String>,
    pub confidence: f64,
    pub description: String,
    pub commands: Vec<String>,
}

impl ConflictResolution {
    pub fn new(
        package: &str,
        resolution_type: ResolutionType,
        target_version: Option<String>,
        confidence: f64,
        description: String,
        commands: Vec<String>,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            package: package.to_string(),
            resolution_type,
            target_version,
            confidence,
            description,
            commands,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub total_conflicts: usize,
    pub version_conflicts: usize,
    pub missing_dependencies: usize,
    pub circular_dependencies: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl ConflictSummary {
    pub fn tally(conflicts: &[ConflictInfo]) -> Self {
        let count_type = |kind: ConflictType| {
            conflicts
                .iter()
                .filter(|conflict| conflict.conflict_type == kind)
                .count()
        };
        let count_severity = |severity: Severity| {
            conflicts
                .iter()
                .filter(|conflict| conflict.severity == severity)
                .count()
        };

        Self {
            total_conflicts: conflicts.len(),
            version_conflicts: count_type(ConflictType::Version),
            missing_dependencies: count_type(ConflictType::Missing),
            circular_dependencies: count_type(ConflictType::Circular),
            errors: count_severity(Severity::Error),
            warnings: count_severity(Severity::Warning),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictAnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub conflicts: Vec<ConflictInfo>,
    pub resolutions: Vec<ConflictResolution>,
    pub summary: ConflictSummary,
    pub auto_resolvable_count: usize,
}

impl ConflictAnalysisReport {
    pub fn conflict_for(&self, package: &str) -> Option<&ConflictInfo> {
        self.conflicts
            .iter()
            .find(|conflict| conflict.package == package)
    }

    pub fn has_blocking_conflicts(&self) -> bool {
        self.summary.errors > 0
    }
}
