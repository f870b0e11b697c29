//! Git-backed [`Vcs`] implementation driving the `git` CLI.
//!
//! Porcelain commands cover the working-tree operations; branch-scoped
//! writes use plumbing (`hash-object`, `mktree`, `commit-tree`,
//! `update-ref`) so a commit can land on a non-checked-out branch without
//! the working tree ever changing. The catalog's trees are flat, which
//! keeps the `mktree` input to one blob line per record file.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;
use url::Url;

use super::{TreeFiles, Vcs, VcsError};

/// Committer identity passed as `-c user.name=…`/`-c user.email=…` so
/// programmatic commits work in environments without git config.
#[derive(Debug, Clone)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

impl Committer {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Committer {
            name: name.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug)]
pub struct GitVcs {
    root: PathBuf,
    committer: Option<Committer>,
}

impl GitVcs {
    /// Opens an existing repository at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, VcsError> {
        let vcs = GitVcs {
            root: root.into(),
            committer: None,
        };
        vcs.run(["rev-parse", "--git-dir"])?;
        Ok(vcs)
    }

    /// Initializes a repository at `root`, creating the directory if
    /// needed.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, VcsError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| VcsError::Io {
            path: root.clone(),
            source,
        })?;
        let vcs = GitVcs {
            root,
            committer: None,
        };
        vcs.run(["init", "-q"])?;
        Ok(vcs)
    }

    /// Opens the repository at `root`, initializing one when the path holds
    /// no repository yet.
    pub fn open_or_init(root: impl Into<PathBuf>) -> Result<Self, VcsError> {
        let root = root.into();
        if root.join(".git").exists() {
            GitVcs::open(root)
        } else {
            GitVcs::init(root)
        }
    }

    /// Clones `url` into `root` and opens the result.
    pub fn clone_from(url: &Url, root: impl Into<PathBuf>) -> Result<Self, VcsError> {
        let root = root.into();
        let output = Command::new("git")
            .arg("clone")
            .arg("-q")
            .arg(url.as_str())
            .arg(&root)
            .output()
            .map_err(|source| VcsError::Io {
                path: root.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(VcsError::Command {
                command: format!("git clone {url}"),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        GitVcs::open(root)
    }

    /// Sets the identity used for commits created through this handle.
    pub fn with_committer(mut self, committer: Committer) -> Self {
        self.committer = Some(committer);
        self
    }

    fn run<I, S>(&self, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.run_with_stdin(args, None)
    }

    /// Runs git with the committer identity injected ahead of the
    /// subcommand.
    fn run_committing<I, S>(&self, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full: Vec<String> = Vec::new();
        if let Some(committer) = &self.committer {
            full.push("-c".to_owned());
            full.push(format!("user.name={}", committer.name));
            full.push("-c".to_owned());
            full.push(format!("user.email={}", committer.email));
        }
        full.extend(args.into_iter().map(Into::into));
        self.run(full)
    }

    fn run_with_stdin<I, S>(&self, args: I, stdin: Option<&str>) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let command_line = format!("git {}", args.join(" "));
        debug!(command = %command_line, root = %self.root.display(), "running git");

        let mut command = Command::new("git");
        command.arg("-C").arg(&self.root).args(&args);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
        if stdin.is_some() {
            command.stdin(Stdio::piped());
        }

        let io_err = |source| VcsError::Io {
            path: self.root.clone(),
            source,
        };

        let output = if let Some(input) = stdin {
            let mut child = command.spawn().map_err(io_err)?;
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes()).map_err(io_err)?;
            }
            child.wait_with_output().map_err(io_err)?
        } else {
            command.output().map_err(io_err)?
        };

        if !output.status.success() {
            return Err(VcsError::Command {
                command: command_line,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        String::from_utf8(output.stdout).map_err(|_| VcsError::NonUtf8Output {
            command: command_line,
        })
    }

    fn non_empty_lines(output: String) -> Vec<String> {
        output
            .lines()
            .map(|line| line.trim().to_owned())
            .filter(|line| !line.is_empty())
            .collect()
    }
}

impl Vcs for GitVcs {
    fn path(&self) -> &Path {
        &self.root
    }

    fn branches(&self) -> Result<Vec<String>, VcsError> {
        let out = self.run([
            "for-each-ref",
            "--format=%(refname:short)",
            "refs/heads",
        ])?;
        Ok(Self::non_empty_lines(out))
    }

    fn remotes(&self) -> Result<Vec<String>, VcsError> {
        Ok(Self::non_empty_lines(self.run(["remote"])?))
    }

    fn remote_branches(&self) -> Result<Vec<String>, VcsError> {
        // `branch -r` is the one listing that advertises the symbolic HEAD
        // pointer as a `remote/HEAD -> remote/branch` line.
        Ok(Self::non_empty_lines(
            self.run(["branch", "-r", "--no-color"])?,
        ))
    }

    fn active_branch(&self) -> Result<String, VcsError> {
        Ok(self.run(["symbolic-ref", "--short", "HEAD"])?.trim().to_owned())
    }

    fn checkout(&self, branch: &str) -> Result<(), VcsError> {
        self.run(["checkout", "-q", branch])?;
        Ok(())
    }

    fn tracked_files(&self, rev: Option<&str>) -> Result<Vec<String>, VcsError> {
        let out = match rev {
            Some(rev) => self.run(["ls-tree", "-r", "--name-only", rev])?,
            None => self.run(["ls-files"])?,
        };
        Ok(Self::non_empty_lines(out))
    }

    fn read_file(&self, path: &str, rev: Option<&str>) -> Result<String, VcsError> {
        match rev {
            Some(rev) => self.run(["cat-file", "blob", &format!("{rev}:{path}")]),
            None => {
                let full = self.root.join(path);
                std::fs::read_to_string(&full).map_err(|source| VcsError::Io {
                    path: full,
                    source,
                })
            }
        }
    }

    fn write_file(&self, path: &str, content: &str) -> Result<(), VcsError> {
        let full = self.root.join(path);
        std::fs::write(&full, content).map_err(|source| VcsError::Io { path: full, source })
    }

    fn track(&self, paths: &[&str]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.run(args.into_iter().map(str::to_owned))?;
        Ok(())
    }

    fn untrack(&self, path: &str) -> Result<(), VcsError> {
        self.run(["rm", "-f", "-q", "--", path])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), VcsError> {
        // --allow-empty keeps commits total: persisting an unchanged
        // snapshot records a commit instead of failing.
        self.run_committing(["commit", "-q", "--allow-empty", "-m", message])?;
        Ok(())
    }

    fn commit_tree(&self, branch: &str, files: &TreeFiles, message: &str) -> Result<(), VcsError> {
        if matches!(self.active_branch(), Ok(active) if active == branch) {
            return Err(VcsError::BranchCheckedOut {
                branch: branch.to_owned(),
            });
        }

        let mut tree_lines = String::new();
        for (name, content) in files {
            let oid = self.run_with_stdin(
                ["hash-object", "-w", "--stdin"].map(str::to_owned),
                Some(content),
            )?;
            tree_lines.push_str(&format!("100644 blob {}\t{}\n", oid.trim(), name));
        }
        let tree = self
            .run_with_stdin(["mktree"].map(str::to_owned), Some(&tree_lines))?
            .trim()
            .to_owned();

        let branch_ref = format!("refs/heads/{branch}");
        let parent = if self.branches()?.iter().any(|b| b == branch) {
            Some(self.run(["rev-parse", &branch_ref])?.trim().to_owned())
        } else {
            None
        };

        let commit = match &parent {
            Some(parent) => self.run_committing(["commit-tree", &tree, "-p", parent, "-m", message])?,
            None => self.run_committing(["commit-tree", &tree, "-m", message])?,
        };
        self.run(["update-ref", &branch_ref, commit.trim()])?;
        Ok(())
    }
}
