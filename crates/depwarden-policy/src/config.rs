use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use depwarden_core::PackageVersion;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_POLICY_PATH: &str = "configs/dependency-policy.toml";

const DEFAULT_DENY_REASON: &str = "Package denied by policy";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagePolicy {
    pub name: String,
    pub allowed: bool,
    pub version_ceiling: Option<PackageVersion>,
    pub version_floor: Option<PackageVersion>,
    pub allowed_versions: Vec<PackageVersion>,
    pub blocked_versions: Vec<PackageVersion>,
    pub upgrade_cadence_days: Option<u32>,
    pub requires_review: bool,
    pub reason: Option<String>,
}

impl PackagePolicy {
    pub fn allow(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allowed: true,
            version_ceiling: None,
            version_floor: None,
            allowed_versions: Vec::new(),
            blocked_versions: Vec::new(),
            upgrade_cadence_days: None,
            requires_review: false,
            reason: None,
        }
    }

    pub fn deny(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            ..Self::allow(name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyPolicy {
    pub default_allowed: bool,
    pub default_upgrade_cadence_days: Option<u32>,
    pub max_major_version_jump: u64,
    pub require_security_review: bool,
    pub allow_pre_releases: bool,
    pub python_version_requirement: Option<String>,
    pub allowlist: BTreeMap<String, PackagePolicy>,
    pub denylist: BTreeMap<String, PackagePolicy>,
}

impl Default for DependencyPolicy {
    fn default() -> Self {
        Self {
            default_allowed: true,
            default_upgrade_cadence_days: None,
            max_major_version_jump: 1,
            require_security_review: true,
            allow_pre_releases: false,
            python_version_requirement: None,
            allowlist: BTreeMap::new(),
            denylist: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    dependency_policy: Option<PolicySection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicySection {
    #[serde(default = "default_true")]
    default_allowed: bool,
    #[serde(default)]
    default_upgrade_cadence_days: Option<u32>,
    #[serde(default = "default_max_major_version_jump")]
    max_major_version_jump: u64,
    #[serde(default = "default_true")]
    require_security_review: bool,
    #[serde(default)]
    allow_pre_releases: bool,
    #[serde(default)]
    python_version_requirement: Option<String>,
    #[serde(default)]
    allowlist: BTreeMap<String, AllowlistEntry>,
    #[serde(default)]
    denylist: BTreeMap<String, DenylistEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AllowlistEntry {
    #[serde(default)]
    version_ceiling: Option<PackageVersion>,
    #[serde(default)]
    version_floor: Option<PackageVersion>,
    #[serde(default)]
    allowed_versions: Vec<PackageVersion>,
    #[serde(default)]
    blocked_versions: Vec<PackageVersion>,
    #[serde(default)]
    upgrade_cadence_days: Option<u32>,
    #[serde(default)]
    requires_review: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DenylistEntry {
    #[serde(default)]
    reason: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_max_major_version_jump() -> u64 {
    1
}

impl DependencyPolicy {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let document: PolicyDocument =
            toml::from_str(input).context("failed to parse dependency policy")?;
        let Some(section) = document.dependency_policy else {
            return Ok(Self::default());
        };

        let mut allowlist = BTreeMap::new();
        for (name, entry) in section.allowlist {
            if let (Some(floor), Some(ceiling)) = (&entry.version_floor, &entry.version_ceiling) {
                if floor > ceiling {
                    return Err(anyhow!(
                        "allowlist entry '{name}' has version floor {floor} above ceiling {ceiling}"
                    ));
                }
            }
            let policy = PackagePolicy {
                name: name.clone(),
                allowed: true,
                version_ceiling: entry.version_ceiling,
                version_floor: entry.version_floor,
                allowed_versions: entry.allowed_versions,
                blocked_versions: entry.blocked_versions,
                upgrade_cadence_days: entry.upgrade_cadence_days,
                requires_review: entry.requires_review,
                reason: entry.reason,
            };
            allowlist.insert(name, policy);
        }

        let denylist = section
            .denylist
            .into_iter()
            .map(|(name, entry)| {
                let reason = entry
                    .reason
                    .unwrap_or_else(|| DEFAULT_DENY_REASON.to_string());
                (name.clone(), PackagePolicy::deny(name, reason))
            })
            .collect();

        Ok(Self {
            default_allowed: section.default_allowed,
            default_upgrade_cadence_days: section.default_upgrade_cadence_days,
            max_major_version_jump: section.max_major_version_jump,
            require_security_review: section.require_security_review,
            allow_pre_releases: section.allow_pre_releases,
            python_version_requirement: section.python_version_requirement,
            allowlist,
            denylist,
        })
    }
}

/// Loads the policy document at `path`, falling back to the permissive default
/// policy when the file is missing or cannot be parsed.
pub fn load_policy(path: &Path) -> DependencyPolicy {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!(
                "Policy config not found: {}, using defaults",
                path.display()
            );
            return DependencyPolicy::default();
        }
        Err(err) => {
            warn!(
                "Failed to read policy config {}: {err}, using defaults",
                path.display()
            );
            return DependencyPolicy::default();
        }
    };

    match DependencyPolicy::from_toml_str(&raw) {
        Ok(policy) => {
            debug!(
                allowlist = policy.allowlist.len(),
                denylist = policy.denylist.len(),
                "loaded dependency policy from {}",
                path.display()
            );
            policy
        }
        Err(err) => {
            warn!(
                "Invalid policy config {}: {err:#}, using defaults",
                path.display()
            );
            DependencyPolicy::default()
        }
    }
}
