use std::fmt;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeCandidate {
    pub package: String,
    pub target_version: Option<String>,
}

impl UpgradeCandidate {
    pub fn new(package: impl Into<String>, target_version: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            target_version: Some(target_version.into()),
        }
    }

    pub fn latest(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            target_version: None,
        }
    }

    /// Parses `name@version` or a bare `name` (upgrade to latest allowed).
    pub fn parse_spec(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (name, version) = match spec.split_once('@') {
            Some((name, version)) => (name.trim(), Some(version.trim())),
            None => (spec, None),
        };

        if name.is_empty() {
            return Err(anyhow!("upgrade candidate must name a package: '{spec}'"));
        }
        match version {
            Some("") => Err(anyhow!("upgrade candidate '{name}' has an empty version")),
            Some(version) => Ok(Self::new(name, version)),
            None => Ok(Self::latest(name)),
        }
    }
}

impl fmt::Display for UpgradeCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target_version {
            Some(version) => write!(f, "{}@{}", self.package, version),
            None => f.write_str(&self.package),
        }
    }
}
