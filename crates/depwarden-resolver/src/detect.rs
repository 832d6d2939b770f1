use std::collections::BTreeSet;

use depwarden_core::{is_wildcard_constraint, Severity};

use crate::constraints::leading_major_version;
use crate::{ConflictInfo, ConflictType, ConstraintSet, DependencyConstraint};

pub(crate) fn detect_conflicts(constraints: &ConstraintSet, tool: &str) -> Vec<ConflictInfo> {
    let mut conflicts = Vec::new();

    for (package, package_constraints) in constraints.packages() {
        if package_constraints.len() <= 1 {
            continue;
        }
        if !has_version_conflict(package_constraints) {
            continue;
        }

        conflicts.push(ConflictInfo {
            package: package.to_string(),
            conflicting_constraints: package_constraints.to_vec(),
            conflict_type: ConflictType::Version,
            severity: Severity::Error,
            resolution_suggestions: suggest_version_resolution(package_constraints, tool),
            auto_resolvable: is_auto_resolvable(package_constraints),
        });
    }

    conflicts
}

pub(crate) fn has_version_conflict(constraints: &[DependencyConstraint]) -> bool {
    let anchored: Vec<&DependencyConstraint> = constraints
        .iter()
        .filter(|c| !is_wildcard_constraint(&c.constraint))
        .collect();
    if anchored.len() < 2 {
        return false;
    }

    let majors: BTreeSet<u64> = anchored
        .iter()
        .filter_map(|c| leading_major_version(&c.constraint))
        .collect();
    majors.len() > 1
}

pub(crate) fn is_auto_resolvable(constraints: &[DependencyConstraint]) -> bool {
    constraints.iter().filter(|c| c.is_direct).count() == 1
}

pub(crate) fn suggest_version_resolution(
    constraints: &[DependencyConstraint],
    tool: &str,
) -> Vec<String> {
    let mut suggestions = Vec::new();

    if let Some(direct) = constraints.iter().find(|c| c.is_direct) {
        suggestions.push(format!(
            "Use direct dependency constraint: {}",
            direct.constraint
        ));
    }
    if constraints.len() == 2 {
        suggestions
            .push("Consider updating one dependency to be compatible with the other".to_string());
    }
    suggestions.push(format!("Review dependency tree with '{tool} show --tree'"));
    suggestions.push("Consider using dependency groups to isolate conflicts".to_string());

    suggestions
}
