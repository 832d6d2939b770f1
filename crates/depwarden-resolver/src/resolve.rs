use chrono::Utc;
use depwarden_core::{DependencyDeclarations, LockData, UpgradeCandidate};
use tracing::{debug, info};

use crate::detect::detect_conflicts;
use crate::{
    ConflictAnalysisReport, ConflictInfo, ConflictResolution, ConflictSummary, ConflictType,
    ConstraintSet, ResolutionType,
};

pub const DEFAULT_TOOL: &str = "poetry";

const MANUAL_CONFIDENCE: f64 = 0.3;
const CONSERVATIVE_PIN_CONFIDENCE: f64 = 0.8;
const PIN_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResolver {
    conservative: bool,
    tool: String,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ConflictResolver {
    pub fn new(conservative: bool) -> Self {
        Self {
            conservative,
            tool: DEFAULT_TOOL.to_string(),
        }
    }

    /// Names the package-manager program used in remediation commands.
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    pub fn analyze_conflicts(
        &self,
        declarations: &DependencyDeclarations,
        lock: Option<&LockData>,
    ) -> ConflictAnalysisReport {
        self.analyze_with_candidates(declarations, lock, &[])
    }

    pub fn analyze_with_candidates(
        &self,
        declarations: &DependencyDeclarations,
        lock: Option<&LockData>,
        candidates: &[UpgradeCandidate],
    ) -> ConflictAnalysisReport {
        let mut constraints = ConstraintSet::from_declarations(declarations);
        if let Some(lock) = lock {
            constraints.add_lock_data(lock);
        }
        constraints.add_candidates(candidates);
        self.analyze_constraint_set(&constraints)
    }

    pub fn analyze_constraint_set(&self, constraints: &ConstraintSet) -> ConflictAnalysisReport {
        info!(
            "Analyzing dependency conflicts across {} package(s)...",
            constraints.len()
        );

        let conflicts = detect_conflicts(constraints, &self.tool);
        let resolutions: Vec<ConflictResolution> = conflicts
            .iter()
            .filter_map(|conflict| self.generate_resolution(conflict))
            .collect();

        for conflict in &conflicts {
            debug!(
                package = %conflict.package,
                constraints = conflict.conflicting_constraints.len(),
                auto_resolvable = conflict.auto_resolvable,
                "version conflict detected"
            );
        }

        let summary = ConflictSummary::tally(&conflicts);
        let auto_resolvable_count = conflicts
            .iter()
            .filter(|conflict| conflict.auto_resolvable)
            .count();

        ConflictAnalysisReport {
            generated_at: Utc::now(),
            conflicts,
            resolutions,
            summary,
            auto_resolvable_count,
        }
    }

    pub fn generate_resolution(&self, conflict: &ConflictInfo) -> Option<ConflictResolution> {
        if conflict.conflict_type != ConflictType::Version {
            return None;
        }

        let package = conflict.package.as_str();
        let tool = self.tool.as_str();
        let confidence = if self.conservative {
            CONSERVATIVE_PIN_CONFIDENCE
        } else {
            PIN_CONFIDENCE
        };

        if let Some(candidate) = conflict.candidate_constraint() {
            if conflict.candidate_blockers().is_empty() {
                let target = candidate.constraint.trim_start_matches("==").to_string();
                return Some(ConflictResolution::new(
                    package,
                    ResolutionType::Upgrade,
                    Some(target.clone()),
                    confidence,
                    format!("Upgrade {package} to {target}, replacing its direct constraint"),
                    vec![format!("{tool} add \"{package}@{target}\"")],
                ));
            }
        }

        let direct: Vec<_> = conflict.direct_constraints().collect();

        if direct.len() != 1 {
            let description = if direct.is_empty() {
                format!("Conflict in transitive dependencies for {package}. Manual review required.")
            } else {
                format!(
                    "Conflicting direct constraints for {package}. Manual review required."
                )
            };
            return Some(ConflictResolution::new(
                package,
                ResolutionType::Manual,
                None,
                MANUAL_CONFIDENCE,
                description,
                vec![
                    format!("{tool} show {package}"),
                    format!("{tool} show --tree | grep {package}"),
                ],
            ));
        }

        let target = direct[0].constraint.clone();

        Some(ConflictResolution::new(
            package,
            ResolutionType::Pin,
            Some(target.clone()),
            confidence,
            format!("Pin {package} to direct dependency constraint: {target}"),
            vec![format!("{tool} add \"{package}@{target}\"")],
        ))
    }
}

pub fn analyze_dependency_conflicts(
    declarations: &DependencyDeclarations,
    lock: Option<&LockData>,
    conservative: bool,
) -> ConflictAnalysisReport {
    ConflictResolver::new(conservative).analyze_conflicts(declarations, lock)
}
