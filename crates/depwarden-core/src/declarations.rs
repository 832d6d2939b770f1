use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

pub const WILDCARD_CONSTRAINT: &str = "*";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencySpec {
    Constraint(String),
    Detailed(DetailedSpec),
    Alternatives(Vec<DetailedSpec>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailedSpec {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub extras: Vec<String>,
    #[serde(default)]
    pub markers: Option<String>,
}

impl DependencySpec {
    /// The version constraint this declaration contributes. Declarations that
    /// carry no version (git/path sources, bare tables) accept any version.
    pub fn constraint(&self) -> &str {
        let version = match self {
            Self::Constraint(constraint) => Some(constraint.as_str()),
            Self::Detailed(detailed) => detailed.version.as_deref(),
            Self::Alternatives(alternatives) => alternatives
                .iter()
                .find_map(|alternative| alternative.version.as_deref()),
        };
        match version.map(str::trim) {
            Some(value) if !value.is_empty() => value,
            _ => WILDCARD_CONSTRAINT,
        }
    }
}

pub fn is_wildcard_constraint(constraint: &str) -> bool {
    let trimmed = constraint.trim();
    trimmed.is_empty() || trimmed == WILDCARD_CONSTRAINT
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDeclarations {
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default, rename = "dev-dependencies")]
    pub dev_dependencies: BTreeMap<String, DependencySpec>,
}

#[derive(Debug, Deserialize)]
struct PyProjectDocument {
    #[serde(default)]
    tool: Option<PyProjectTools>,
}

#[derive(Debug, Deserialize)]
struct PyProjectTools {
    #[serde(default)]
    poetry: Option<PoetrySection>,
}

#[derive(Debug, Deserialize)]
struct PoetrySection {
    #[serde(default)]
    dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default, rename = "dev-dependencies")]
    dev_dependencies: BTreeMap<String, DependencySpec>,
    #[serde(default)]
    group: BTreeMap<String, PoetryGroup>,
}

#[derive(Debug, Deserialize)]
struct PoetryGroup {
    #[serde(default)]
    dependencies: BTreeMap<String, DependencySpec>,
}

impl DependencyDeclarations {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let declarations: Self =
            toml::from_str(input).context("failed to parse dependency declarations")?;
        declarations.validate()?;
        Ok(declarations)
    }

    /// Reads the `[tool.poetry]` section of a pyproject document. Dependency
    /// groups are folded into the development declarations; the interpreter
    /// requirement (`python`) is not a package and is skipped.
    pub fn from_pyproject_str(input: &str) -> anyhow::Result<Self> {
        let document: PyProjectDocument =
            toml::from_str(input).context("failed to parse pyproject document")?;
        let poetry = document
            .tool
            .and_then(|tool| tool.poetry)
            .ok_or_else(|| anyhow!("pyproject document has no [tool.poetry] section"))?;

        let mut declarations = Self {
            dependencies: poetry.dependencies,
            dev_dependencies: poetry.dev_dependencies,
        };
        declarations.dependencies.remove("python");

        for group in poetry.group.into_values() {
            for (name, spec) in group.dependencies {
                if declarations.dependencies.contains_key(&name)
                    || declarations.dev_dependencies.contains_key(&name)
                {
                    continue;
                }
                declarations.dev_dependencies.insert(name, spec);
            }
        }

        declarations.validate()?;
        Ok(declarations)
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty() && self.dev_dependencies.is_empty()
    }

    fn validate(&self) -> anyhow::Result<()> {
        for name in self
            .dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
        {
            if name.trim().is_empty() {
                return Err(anyhow!("dependency declarations contain an empty package name"));
            }
        }
        Ok(())
    }
}
