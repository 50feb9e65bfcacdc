//! Workspace-local configuration: the `.rev/` state layout, environment
//! driven runtime knobs, and the optional per-repo `.rev/config.toml`.

pub mod layout;
pub mod repo;
pub mod runtime;

pub use layout::StateLayout;
pub use repo::RepoConfig;
pub use runtime::{ExecutionMode, RuntimeConfig, VerifyMode};
