mod constraints;
mod detect;
mod resolve;
mod types;

pub use constraints::{
    leading_major_version, ConstraintSet, CANDIDATE_REQUIRER, ROOT_DEV_REQUIRER, ROOT_REQUIRER,
};
pub use resolve::{analyze_dependency_conflicts, ConflictResolver, DEFAULT_TOOL};
pub use types::{
    ConflictAnalysisReport, ConflictInfo, ConflictResolution, ConflictSummary, ConflictType,
    DependencyConstraint, ResolutionType,
};
