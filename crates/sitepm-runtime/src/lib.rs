//! sitepm Runtime - Shell commands, process groups and host collaborators

pub mod git;
pub mod shell;
pub mod signal;
pub mod traits;

pub use git::GitCli;
pub use shell::{RunOutcome, ShellCommand};
pub use traits::{NoWordPress, NodeLocator, SourceControl, SystemNode, VersionDirNode, WordPressEnv};
