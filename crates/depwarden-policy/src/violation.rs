use std::fmt;

use depwarden_core::Severity;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    PackageDenied,
    VersionDenied,
    MajorVersionJump,
    UpgradeCadence,
    ReviewRequired,
}

impl ViolationType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PackageDenied => "package_denied",
            Self::VersionDenied => "version_denied",
            Self::MajorVersionJump => "major_version_jump",
            Self::UpgradeCadence => "upgrade_cadence",
            Self::ReviewRequired => "review_required",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub package: String,
    pub current_version: Option<String>,
    pub target_version: Option<String>,
    pub violation_type: ViolationType,
    pub message: String,
    pub severity: Severity,
}

impl PolicyViolation {
    pub(crate) fn new(
        package: &str,
        current_version: Option<&str>,
        target_version: Option<&str>,
        violation_type: ViolationType,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            package: package.to_string(),
            current_version: current_version.map(str::to_string),
            target_version: target_version.map(str::to_string),
            violation_type,
            message: message.into(),
            severity,
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Error
    }
}
