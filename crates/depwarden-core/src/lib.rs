mod candidate;
mod declarations;
mod lockfile;
mod severity;
mod version;

pub use candidate::UpgradeCandidate;
pub use declarations::{
    is_wildcard_constraint, DependencyDeclarations, DependencySpec, DetailedSpec,
    WILDCARD_CONSTRAINT,
};
pub use lockfile::{LockData, LockedPackage};
pub use severity::Severity;
pub use version::{PackageVersion, VersionError};
