//! The version-control seam the catalog sits on.
//!
//! Everything the collection repository needs from the underlying
//! version-control system is collected in the [`Vcs`] trait: branch and
//! remote enumeration, reads of committed blob content, working-tree writes
//! on the active branch, and [`Vcs::commit_tree`] for writing a commit onto
//! any other branch without touching the working tree. Keeping the seam
//! this narrow lets the same catalog logic run against a real git working
//! tree ([`git::GitVcs`]) or an in-memory stand-in ([`memory::MemoryVcs`]).
//!
//! Reads against a revision (`Some(rev)`) inspect committed content only
//! and never disturb the working tree; reads with `None` inspect the index
//! or the working tree of the active branch. One in-flight mutation at a
//! time; the catalog is single-threaded by design.

pub mod git;
pub mod memory;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// A flat mapping from file name to file content, the shape of every tree
/// this catalog commits.
pub type TreeFiles = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("i/o error under {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed with {code:?}: {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("`{command}` produced output that is not valid UTF-8")]
    NonUtf8Output { command: String },
    #[error("unknown revision {rev:?}")]
    UnknownRev { rev: String },
    #[error("unknown branch {branch:?}")]
    UnknownBranch { branch: String },
    #[error("no file {path:?} at {rev:?}")]
    MissingFile { path: String, rev: String },
    #[error("branch {branch:?} is checked out; refusing to rewrite it behind the working tree")]
    BranchCheckedOut { branch: String },
}

/// Version-control operations the collection repository relies on.
pub trait Vcs {
    /// Root of the working tree. Used for display names and the collection
    /// node IRI; an in-memory implementation may return a synthetic path.
    fn path(&self) -> &Path;

    /// Local branch names.
    fn branches(&self) -> Result<Vec<String>, VcsError>;

    /// Configured remote names.
    fn remotes(&self) -> Result<Vec<String>, VcsError>;

    /// Remote-tracking branch lines as advertised by the VCS, e.g.
    /// `origin/master`. A symbolic HEAD pointer is distinguishable by its
    /// `-> target` suffix: `origin/HEAD -> origin/master`.
    fn remote_branches(&self) -> Result<Vec<String>, VcsError>;

    /// Name of the currently checked-out branch.
    fn active_branch(&self) -> Result<String, VcsError>;

    fn checkout(&self, branch: &str) -> Result<(), VcsError>;

    /// Tracked file paths at `rev`, or in the index when `rev` is `None`.
    fn tracked_files(&self, rev: Option<&str>) -> Result<Vec<String>, VcsError>;

    /// Content of `path` at `rev`, or from the working tree when `rev` is
    /// `None`.
    fn read_file(&self, path: &str, rev: Option<&str>) -> Result<String, VcsError>;

    /// Writes `content` to `path` in the working tree.
    fn write_file(&self, path: &str, content: &str) -> Result<(), VcsError>;

    /// Starts tracking the given working-tree paths.
    fn track(&self, paths: &[&str]) -> Result<(), VcsError>;

    /// Stops tracking `path` and removes it from the working tree.
    fn untrack(&self, path: &str) -> Result<(), VcsError>;

    /// Commits the index on the active branch.
    fn commit(&self, message: &str) -> Result<(), VcsError>;

    /// Commits a tree consisting of exactly `files` onto `branch`, without
    /// checking it out and without touching the working tree. The branch is
    /// created if it does not exist yet.
    ///
    /// Implementations refuse the currently checked-out branch
    /// ([`VcsError::BranchCheckedOut`]); writes to the active branch go
    /// through the working tree so index, tree and history stay in step.
    fn commit_tree(&self, branch: &str, files: &TreeFiles, message: &str) -> Result<(), VcsError>;
}
