use std::collections::BTreeMap;

use depwarden_core::{is_wildcard_constraint, DependencyDeclarations, LockData, UpgradeCandidate};

use crate::DependencyConstraint;

pub const ROOT_REQUIRER: &str = "<root>";
pub const ROOT_DEV_REQUIRER: &str = "<root-dev>";
pub const CANDIDATE_REQUIRER: &str = "<upgrade-candidate>";

const UNNAMED_PREFIX: &str = "unnamed-";

/// Every declared constraint, grouped by the package it constrains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    by_package: BTreeMap<String, Vec<DependencyConstraint>>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, constraint: DependencyConstraint) {
        self.by_package
            .entry(constraint.package.clone())
            .or_default()
            .push(constraint);
    }

    pub fn contains(&self, package: &str) -> bool {
        self.by_package.contains_key(package)
    }

    pub fn get(&self, package: &str) -> &[DependencyConstraint] {
        self.by_package
            .get(package)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn packages(&self) -> impl Iterator<Item = (&str, &[DependencyConstraint])> {
        self.by_package
            .iter()
            .map(|(name, constraints)| (name.as_str(), constraints.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.by_package.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_package.is_empty()
    }

    /// Runtime declarations first; a development declaration only counts when
    /// nothing else has declared the package yet.
    pub fn from_declarations(declarations: &DependencyDeclarations) -> Self {
        let mut set = Self::new();
        for (name, spec) in &declarations.dependencies {
            set.push(DependencyConstraint::direct(
                name,
                spec.constraint(),
                ROOT_REQUIRER,
            ));
        }
        for (name, spec) in &declarations.dev_dependencies {
            if set.contains(name) {
                continue;
            }
            set.push(DependencyConstraint::direct(
                name,
                spec.constraint(),
                ROOT_DEV_REQUIRER,
            ));
        }
        set
    }

    /// Folds the requirements locked packages place on each other in as
    /// transitive constraints. Locked packages without a name get a fallback
    /// identifier that is unique within this call only.
    pub fn add_lock_data(&mut self, lock: &LockData) {
        let mut unnamed = 0usize;
        for package in &lock.packages {
            let name = match package.name.as_deref().map(str::trim) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    unnamed += 1;
                    format!("{UNNAMED_PREFIX}{unnamed}")
                }
            };
            let required_by = match package.version.as_deref() {
                Some(version) => format!("{name}@{version}"),
                None => name,
            };

            for (dependency, spec) in &package.dependencies {
                self.push(DependencyConstraint::transitive(
                    dependency,
                    spec.constraint(),
                    &required_by,
                ));
            }
        }
    }

    pub fn add_candidates(&mut self, candidates: &[UpgradeCandidate]) {
        for candidate in candidates {
            let Some(target) = candidate.target_version.as_deref() else {
                continue;
            };
            self.push(DependencyConstraint::transitive(
                &candidate.package,
                &format!("=={target}"),
                CANDIDATE_REQUIRER,
            ));
        }
    }
}

/// Extracts the major version a constraint anchors on, e.g. `^2.28` -> 2,
/// `>=1.21,<3` -> 1, `==4.0.0` -> 4. Upper-bound and exclusion clauses do not
/// anchor a major version and yield `None`, as do wildcards.
pub fn leading_major_version(constraint: &str) -> Option<u64> {
    if is_wildcard_constraint(constraint) {
        return None;
    }

    let first_clause = constraint
        .split([',', '|'])
        .map(str::trim)
        .find(|clause| !clause.is_empty())?;

    if first_clause.starts_with('<') || first_clause.starts_with("!=") {
        return None;
    }

    let unprefixed = ["~=", "===", "==", ">=", "^", "~", "=", ">"]
        .iter()
        .find_map(|operator| first_clause.strip_prefix(operator))
        .unwrap_or(first_clause)
        .trim_start()
        .trim_start_matches(['v', 'V']);

    let digits_end = unprefixed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(unprefixed.len());
    unprefixed[..digits_end].parse().ok()
}
