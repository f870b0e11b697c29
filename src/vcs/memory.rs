//! Simple in-memory [`Vcs`] implementation.
//!
//! Useful for unit tests or ephemeral catalogs where persistence is not
//! required. Branches are plain tree snapshots, the working tree is a map,
//! and remotes are seeded through the builder-style helpers. Interior
//! mutability keeps the trait surface identical to the git backend under
//! the crate's single-threaded model.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::{TreeFiles, Vcs, VcsError};

#[derive(Debug, Default, Clone)]
struct RemoteState {
    branches: BTreeMap<String, TreeFiles>,
    /// Branch the remote's symbolic HEAD points at, when advertised.
    head: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    branches: BTreeMap<String, TreeFiles>,
    active: String,
    worktree: TreeFiles,
    index: BTreeSet<String>,
    remotes: BTreeMap<String, RemoteState>,
    /// `(branch, message)` log of every commit, newest last.
    log: Vec<(String, String)>,
}

#[derive(Debug)]
pub struct MemoryVcs {
    path: PathBuf,
    state: RefCell<State>,
}

impl MemoryVcs {
    /// A fresh repository with `master` as the (unborn) active branch.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MemoryVcs {
            path: path.into(),
            state: RefCell::new(State {
                active: "master".to_owned(),
                ..State::default()
            }),
        }
    }

    /// Registers `remote` with no branches yet.
    pub fn add_remote(&self, remote: &str) {
        self.state
            .borrow_mut()
            .remotes
            .entry(remote.to_owned())
            .or_default();
    }

    /// Seeds a branch tree under `remote`.
    pub fn set_remote_branch(&self, remote: &str, branch: &str, files: TreeFiles) {
        self.state
            .borrow_mut()
            .remotes
            .entry(remote.to_owned())
            .or_default()
            .branches
            .insert(branch.to_owned(), files);
    }

    /// Advertises `remote`'s symbolic HEAD as pointing at `branch`.
    pub fn set_remote_head(&self, remote: &str, branch: &str) {
        self.state
            .borrow_mut()
            .remotes
            .entry(remote.to_owned())
            .or_default()
            .head = Some(branch.to_owned());
    }

    /// Commit messages recorded so far, paired with their branch.
    pub fn log(&self) -> Vec<(String, String)> {
        self.state.borrow().log.clone()
    }

    fn resolve_tree(&self, rev: &str) -> Result<TreeFiles, VcsError> {
        let state = self.state.borrow();
        let branch = if rev == "HEAD" { &state.active } else { rev };
        if let Some(tree) = state.branches.get(branch) {
            return Ok(tree.clone());
        }
        if let Some((remote, rest)) = branch.split_once('/') {
            if let Some(remote) = state.remotes.get(remote) {
                if let Some(tree) = remote.branches.get(rest) {
                    return Ok(tree.clone());
                }
            }
        }
        Err(VcsError::UnknownRev {
            rev: rev.to_owned(),
        })
    }
}

impl Vcs for MemoryVcs {
    fn path(&self) -> &Path {
        &self.path
    }

    fn branches(&self) -> Result<Vec<String>, VcsError> {
        Ok(self.state.borrow().branches.keys().cloned().collect())
    }

    fn remotes(&self) -> Result<Vec<String>, VcsError> {
        Ok(self.state.borrow().remotes.keys().cloned().collect())
    }

    fn remote_branches(&self) -> Result<Vec<String>, VcsError> {
        let state = self.state.borrow();
        let mut lines = Vec::new();
        for (name, remote) in &state.remotes {
            if let Some(head) = &remote.head {
                lines.push(format!("{name}/HEAD -> {name}/{head}"));
            }
            for branch in remote.branches.keys() {
                lines.push(format!("{name}/{branch}"));
            }
        }
        Ok(lines)
    }

    fn active_branch(&self) -> Result<String, VcsError> {
        Ok(self.state.borrow().active.clone())
    }

    fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        let mut state = self.state.borrow_mut();
        let tree = state
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| VcsError::UnknownBranch {
                branch: branch.to_owned(),
            })?;
        state.active = branch.to_owned();
        state.index = tree.keys().cloned().collect();
        state.worktree = tree;
        Ok(())
    }

    fn tracked_files(&self, rev: Option<&str>) -> Result<Vec<String>, VcsError> {
        match rev {
            Some(rev) => Ok(self.resolve_tree(rev)?.into_keys().collect()),
            None => Ok(self.state.borrow().index.iter().cloned().collect()),
        }
    }

    fn read_file(&self, path: &str, rev: Option<&str>) -> Result<String, VcsError> {
        let missing = || VcsError::MissingFile {
            path: path.to_owned(),
            rev: rev.unwrap_or("worktree").to_owned(),
        };
        match rev {
            Some(rev) => self.resolve_tree(rev)?.remove(path).ok_or_else(missing),
            None => self
                .state
                .borrow()
                .worktree
                .get(path)
                .cloned()
                .ok_or_else(missing),
        }
    }

    fn write_file(&self, path: &str, content: &str) -> Result<(), VcsError> {
        self.state
            .borrow_mut()
            .worktree
            .insert(path.to_owned(), content.to_owned());
        Ok(())
    }

    fn track(&self, paths: &[&str]) -> Result<(), VcsError> {
        let mut state = self.state.borrow_mut();
        for path in paths {
            if !state.worktree.contains_key(*path) {
                return Err(VcsError::MissingFile {
                    path: (*path).to_owned(),
                    rev: "worktree".to_owned(),
                });
            }
            state.index.insert((*path).to_owned());
        }
        Ok(())
    }

    fn untrack(&self, path: &str) -> Result<(), VcsError> {
        let mut state = self.state.borrow_mut();
        if !state.index.remove(path) {
            return Err(VcsError::MissingFile {
                path: path.to_owned(),
                rev: "index".to_owned(),
            });
        }
        state.worktree.remove(path);
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), VcsError> {
        let mut state = self.state.borrow_mut();
        let tree: TreeFiles = state
            .index
            .iter()
            .filter_map(|path| {
                state
                    .worktree
                    .get(path)
                    .map(|content| (path.clone(), content.clone()))
            })
            .collect();
        let active = state.active.clone();
        state.branches.insert(active.clone(), tree);
        state.log.push((active, message.to_owned()));
        Ok(())
    }

    fn commit_tree(&self, branch: &str, files: &TreeFiles, message: &str) -> Result<(), VcsError> {
        let mut state = self.state.borrow_mut();
        if state.active == branch {
            return Err(VcsError::BranchCheckedOut {
                branch: branch.to_owned(),
            });
        }
        state.branches.insert(branch.to_owned(), files.clone());
        state.log.push((branch.to_owned(), message.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktree_commit_and_checkout() {
        let vcs = MemoryVcs::new("/mem/repo");
        vcs.write_file("a", "alpha").unwrap();
        vcs.track(&["a"]).unwrap();
        vcs.commit("first").unwrap();

        assert_eq!(vcs.branches().unwrap(), vec!["master".to_owned()]);
        assert_eq!(vcs.read_file("a", Some("master")).unwrap(), "alpha");

        vcs.commit_tree(
            "side",
            &TreeFiles::from([("b".to_owned(), "beta".to_owned())]),
            "side commit",
        )
        .unwrap();
        assert_eq!(vcs.active_branch().unwrap(), "master");
        assert_eq!(vcs.read_file("b", Some("side")).unwrap(), "beta");
        // the working tree stayed on master
        assert!(vcs.read_file("b", None).is_err());

        vcs.checkout("side").unwrap();
        assert_eq!(vcs.read_file("b", None).unwrap(), "beta");
        assert!(vcs.read_file("a", None).is_err());
    }

    #[test]
    fn commit_tree_refuses_active_branch() {
        let vcs = MemoryVcs::new("/mem/repo");
        vcs.write_file("a", "alpha").unwrap();
        vcs.track(&["a"]).unwrap();
        vcs.commit("first").unwrap();

        let err = vcs
            .commit_tree("master", &TreeFiles::new(), "nope")
            .unwrap_err();
        assert!(matches!(err, VcsError::BranchCheckedOut { .. }));
    }

    #[test]
    fn remote_branch_lines_carry_head_pointer() {
        let vcs = MemoryVcs::new("/mem/repo");
        vcs.set_remote_branch("origin", "master", TreeFiles::new());
        vcs.set_remote_head("origin", "master");

        let lines = vcs.remote_branches().unwrap();
        assert!(lines.contains(&"origin/HEAD -> origin/master".to_owned()));
        assert!(lines.contains(&"origin/master".to_owned()));
        assert_eq!(vcs.tracked_files(Some("origin/master")).unwrap().len(), 0);
    }
}
