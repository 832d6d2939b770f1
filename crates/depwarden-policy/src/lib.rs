mod config;
mod engine;
mod violation;

pub use config::{load_policy, DependencyPolicy, PackagePolicy, DEFAULT_POLICY_PATH};
pub use engine::{CandidateEvaluation, Decision, PolicyEngine, Rejection, ScreeningOutcome};
pub use violation::{PolicyViolation, ViolationType};
