use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use depwarden_core::{PackageVersion, Severity, UpgradeCandidate, VersionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{DependencyPolicy, PolicyViolation, ViolationType};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0}")]
    Denylisted(String),
    #[error("Package not in allowlist and default policy is deny")]
    NotAllowlisted,
    #[error("Invalid version: {0}")]
    InvalidVersion(#[from] VersionError),
    #[error("Version {0} is blocked")]
    Blocked(String),
    #[error("Version {0} not in allowed versions")]
    NotInAllowedVersions(String),
    #[error("Version exceeds ceiling: {0}")]
    AboveCeiling(String),
    #[error("Version below floor: {0}")]
    BelowFloor(String),
    #[error("Pre-release versions not allowed")]
    PreRelease,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Rejected(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn reason(&self) -> Option<&Rejection> {
        match self {
            Self::Allowed => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub candidate: UpgradeCandidate,
    pub current_version: Option<String>,
    pub violations: Vec<PolicyViolation>,
}

impl CandidateEvaluation {
    pub fn is_blocked(&self) -> bool {
        self.violations.iter().any(PolicyViolation::is_blocking)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningOutcome {
    pub approved: Vec<CandidateEvaluation>,
    pub blocked: Vec<CandidateEvaluation>,
}

impl ScreeningOutcome {
    pub fn approved_candidates(&self) -> Vec<UpgradeCandidate> {
        self.approved
            .iter()
            .map(|evaluation| evaluation.candidate.clone())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    policy: DependencyPolicy,
    last_upgrades: HashMap<String, DateTime<Utc>>,
}

impl PolicyEngine {
    pub fn new(policy: DependencyPolicy) -> Self {
        Self {
            policy,
            last_upgrades: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &DependencyPolicy {
        &self.policy
    }

    pub fn last_upgrade(&self, name: &str) -> Option<DateTime<Utc>> {
        self.last_upgrades.get(name).copied()
    }

    pub fn check_package_allowed(&self, name: &str) -> Decision {
        if let Some(entry) = self.policy.denylist.get(name) {
            let reason = entry
                .reason
                .clone()
                .unwrap_or_else(|| "Package in denylist".to_string());
            return Decision::Rejected(Rejection::Denylisted(reason));
        }

        if self.policy.allowlist.contains_key(name) {
            return Decision::Allowed;
        }

        if !self.policy.default_allowed {
            return Decision::Rejected(Rejection::NotAllowlisted);
        }

        Decision::Allowed
    }

    pub fn check_version_allowed(&self, name: &str, version: &str) -> Decision {
        let parsed = match PackageVersion::parse(version) {
            Ok(parsed) => parsed,
            Err(err) => return Decision::Rejected(err.into()),
        };

        if let Some(entry) = self.policy.allowlist.get(name) {
            if entry.blocked_versions.contains(&parsed) {
                return Decision::Rejected(Rejection::Blocked(version.to_string()));
            }

            if !entry.allowed_versions.is_empty() && !entry.allowed_versions.contains(&parsed) {
                return Decision::Rejected(Rejection::NotInAllowedVersions(version.to_string()));
            }

            if let Some(ceiling) = &entry.version_ceiling {
                if parsed > *ceiling {
                    return Decision::Rejected(Rejection::AboveCeiling(ceiling.to_string()));
                }
            }

            if let Some(floor) = &entry.version_floor {
                if parsed < *floor {
                    return Decision::Rejected(Rejection::BelowFloor(floor.to_string()));
                }
            }
        }

        if parsed.is_prerelease() && !self.policy.allow_pre_releases {
            return Decision::Rejected(Rejection::PreRelease);
        }

        Decision::Allowed
    }

    pub fn check_upgrade_allowed(
        &self,
        name: &str,
        current_version: &str,
        target_version: &str,
    ) -> Vec<PolicyViolation> {
        self.evaluate_upgrade(name, Some(current_version), Some(target_version), Utc::now())
    }

    pub fn check_upgrade_allowed_at(
        &self,
        name: &str,
        current_version: &str,
        target_version: &str,
        now: DateTime<Utc>,
    ) -> Vec<PolicyViolation> {
        self.evaluate_upgrade(name, Some(current_version), Some(target_version), now)
    }

    fn evaluate_upgrade(
        &self,
        name: &str,
        current_version: Option<&str>,
        target_version: Option<&str>,
        now: DateTime<Utc>,
    ) -> Vec<PolicyViolation> {
        let violation = |violation_type, message: String, severity| {
            PolicyViolation::new(
                name,
                current_version,
                target_version,
                violation_type,
                message,
                severity,
            )
        };

        if let Decision::Rejected(rejection) = self.check_package_allowed(name) {
            return vec![violation(
                ViolationType::PackageDenied,
                rejection.to_string(),
                Severity::Error,
            )];
        }

        let mut violations = Vec::new();

        if let Some(target) = target_version {
            if let Decision::Rejected(rejection) = self.check_version_allowed(name, target) {
                violations.push(violation(
                    ViolationType::VersionDenied,
                    rejection.to_string(),
                    Severity::Error,
                ));
            }
        }

        if let Some(jump) = major_version_jump(current_version, target_version) {
            if jump > self.policy.max_major_version_jump {
                violations.push(violation(
                    ViolationType::MajorVersionJump,
                    format!(
                        "Major version jump ({jump}) exceeds policy limit ({})",
                        self.policy.max_major_version_jump
                    ),
                    Severity::Warning,
                ));
            }
        }

        let package_policy = self.policy.allowlist.get(name);
        let cadence_days = match package_policy {
            Some(entry) => entry.upgrade_cadence_days,
            None => self.policy.default_upgrade_cadence_days,
        };
        if let (Some(cadence_days), Some(last_upgrade)) =
            (cadence_days.filter(|days| *days > 0), self.last_upgrade(name))
        {
            let elapsed = now.signed_duration_since(last_upgrade);
            if elapsed < Duration::days(i64::from(cadence_days)) {
                violations.push(violation(
                    ViolationType::UpgradeCadence,
                    format!(
                        "Upgrade cadence not met: {}/{cadence_days} days",
                        elapsed.num_days().max(0)
                    ),
                    Severity::Warning,
                ));
            }
        }

        if package_policy.is_some_and(|entry| entry.requires_review) {
            violations.push(violation(
                ViolationType::ReviewRequired,
                "Package requires manual review before upgrade".to_string(),
                Severity::Info,
            ));
        }

        violations
    }

    /// Evaluates every candidate and splits them into approved and blocked
    /// sets. A candidate is blocked by any error-severity violation; warnings
    /// and informational findings travel with approved candidates.
    pub fn screen<F>(&self, candidates: &[UpgradeCandidate], mut current_version: F) -> ScreeningOutcome
    where
        F: FnMut(&str) -> Option<String>,
    {
        let now = Utc::now();
        let mut outcome = ScreeningOutcome::default();

        for candidate in candidates {
            let current = current_version(&candidate.package);
            let violations = self.evaluate_upgrade(
                &candidate.package,
                current.as_deref(),
                candidate.target_version.as_deref(),
                now,
            );
            let evaluation = CandidateEvaluation {
                candidate: candidate.clone(),
                current_version: current,
                violations,
            };

            if evaluation.is_blocked() {
                debug!(
                    "policy blocked upgrade candidate {}: {} violation(s)",
                    candidate,
                    evaluation.violations.len()
                );
                outcome.blocked.push(evaluation);
            } else {
                outcome.approved.push(evaluation);
            }
        }

        outcome
    }

    pub fn record_upgrade(&mut self, name: &str) {
        self.record_upgrade_at(name, Utc::now());
    }

    pub fn record_upgrade_at(&mut self, name: &str, at: DateTime<Utc>) {
        self.last_upgrades.insert(name.to_string(), at);
    }
}

fn major_version_jump(current: Option<&str>, target: Option<&str>) -> Option<u64> {
    let current = PackageVersion::parse(current?).ok()?;
    let target = PackageVersion::parse(target?).ok()?;
    target.major().checked_sub(current.major()).filter(|jump| *jump > 0)
}
