//! The collection repository: one version-controlled working tree holding
//! the persisted state of a collection.
//!
//! The working tree contains exactly one `collection` file (repository
//! metadata, its first line carries the display name behind a fixed
//! 18-character label) plus one file per handle record in the codec format
//! of [`crate::record`]. A file is part of the collection only if it is
//! tracked; merely being present on disk is not sufficient.
//!
//! [`CollectionRepo`] is a stateless accessor: every query re-reads the
//! repository, and snapshots loaded from it must be explicitly reloaded or
//! committed to re-synchronize. Writes on the active branch go through the
//! working tree; writes on any other branch go through
//! [`Vcs::commit_tree`], so no operation ever checks out a different
//! branch behind the caller's back.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::record::{HandleRecord, MalformedRecordError};
use crate::vcs::git::GitVcs;
use crate::vcs::{TreeFiles, Vcs, VcsError};

/// Name of the repository-level metadata file.
pub const COLLECTION_FILE: &str = "collection";

/// Fixed label prefix of the `collection` file's first line; the display
/// name starts at byte 18.
pub const NAME_LABEL: &str = "collection name = ";

/// Handle records keyed by handle name.
pub type RecordSet = BTreeMap<String, HandleRecord>;

/// Per-remote, per-branch record sets.
pub type RemoteRecords = BTreeMap<String, BTreeMap<String, RecordSet>>;

#[derive(Debug, Error)]
pub enum RepoError {
    /// Tracked files exist but the `collection` file is not among them.
    #[error("broken collection repository: tracked files exist but no `collection` file")]
    BrokenCollection,
    /// A record file failed to decode.
    #[error("malformed record file {path:?}")]
    MalformedRecord {
        path: String,
        #[source]
        source: MalformedRecordError,
    },
    /// A remote advertises a HEAD pointer whose target branch was not
    /// enumerated.
    #[error("remote {remote:?} advertises HEAD -> {target:?}, but that branch was not enumerated")]
    RemoteHeadUnresolved { remote: String, target: String },
    #[error(transparent)]
    Vcs(#[from] VcsError),
}

/// The replaceable seam between handle names and storage keys (file
/// names). Identity for now; anything reversible will do as long as both
/// directions agree.
pub trait KeyMapping {
    fn key_to_filename(&self, key: &str) -> String;
    fn filename_to_key(&self, filename: &str) -> String;
}

/// The default `name == filename` mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMapping;

impl KeyMapping for IdentityMapping {
    fn key_to_filename(&self, key: &str) -> String {
        key.to_owned()
    }

    fn filename_to_key(&self, filename: &str) -> String {
        filename.to_owned()
    }
}

#[derive(Debug)]
pub struct CollectionRepo<V: Vcs, M: KeyMapping = IdentityMapping> {
    vcs: V,
    name: String,
    mapping: M,
}

impl<V: Vcs> CollectionRepo<V> {
    /// Opens the collection backed by `vcs`, initializing it when the
    /// repository holds no tracked files yet.
    ///
    /// A brand-new collection gets a `collection` file (named after `name`,
    /// or the directory basename when absent) and an initial commit.
    /// Re-opening an initialized collection reads the stored name and
    /// never rewrites or re-commits anything. Tracked files without a
    /// `collection` file fail with [`RepoError::BrokenCollection`].
    pub fn open(vcs: V, name: Option<&str>) -> Result<Self, RepoError> {
        Self::open_with_mapping(vcs, name, IdentityMapping)
    }
}

impl CollectionRepo<GitVcs> {
    /// Opens or initializes a git-backed collection at `path`. When `url`
    /// is given and `path` holds no repository yet, the clone source is
    /// fetched first.
    pub fn at(path: &Path, url: Option<&Url>, name: Option<&str>) -> Result<Self, RepoError> {
        let vcs = match url {
            Some(url) if !path.join(".git").exists() => GitVcs::clone_from(url, path)?,
            _ => GitVcs::open_or_init(path)?,
        };
        Self::open(vcs, name)
    }
}

impl<V: Vcs, M: KeyMapping> CollectionRepo<V, M> {
    pub fn open_with_mapping(vcs: V, name: Option<&str>, mapping: M) -> Result<Self, RepoError> {
        let tracked = vcs.tracked_files(None)?;

        let name = if tracked.is_empty() {
            let name = match name {
                Some(name) => name.to_owned(),
                None => basename(vcs.path()),
            };
            vcs.write_file(COLLECTION_FILE, &format!("{NAME_LABEL}{name}\n"))?;
            vcs.track(&[COLLECTION_FILE])?;
            vcs.commit("Collection initialized.")?;
            info!(name = %name, path = %vcs.path().display(), "initialized collection repository");
            name
        } else if !tracked.iter().any(|f| f == COLLECTION_FILE) {
            return Err(RepoError::BrokenCollection);
        } else {
            let content = vcs.read_file(COLLECTION_FILE, None)?;
            let first = content.lines().next().unwrap_or("");
            // The name starts after the fixed-width label, whatever the
            // label bytes happen to say.
            first.get(NAME_LABEL.len()..).unwrap_or("").to_owned()
        };

        Ok(CollectionRepo { vcs, name, mapping })
    }

    /// The collection's display name as stored in the `collection` file.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    pub fn path(&self) -> &Path {
        self.vcs.path()
    }

    /// IRI of the collection node in joined metadata graphs.
    pub fn collection_iri(&self) -> String {
        match Url::from_file_path(self.path()) {
            Ok(url) => url.into(),
            Err(()) => format!("file://{}", self.path().display()),
        }
    }

    /// Decodes every tracked record file at `rev`, keyed by handle name.
    pub fn handle_records(&self, rev: &str) -> Result<RecordSet, RepoError> {
        let mut out = RecordSet::new();
        for file in self.vcs.tracked_files(Some(rev))? {
            if file == COLLECTION_FILE {
                continue;
            }
            let content = self.vcs.read_file(&file, Some(rev))?;
            let record =
                HandleRecord::decode(&content).map_err(|source| RepoError::MalformedRecord {
                    path: file.clone(),
                    source,
                })?;
            out.insert(self.mapping.filename_to_key(&file), record);
        }
        Ok(out)
    }

    /// Record sets of every branch of every configured remote (or of the
    /// single remote named by `filter`), keyed by remote and short branch
    /// name.
    ///
    /// When a remote advertises a symbolic HEAD pointer, its target's
    /// record set is aliased under the synthetic `HEAD` key. A remote
    /// without a discoverable pointer gets no `HEAD` entry; a pointer at a
    /// branch that was not enumerated is an error rather than a silent
    /// default.
    pub fn remote_records(&self, filter: Option<&str>) -> Result<RemoteRecords, RepoError> {
        let lines = self.vcs.remote_branches()?;
        let mut remotes = RemoteRecords::new();

        for remote in self.vcs.remotes()? {
            if filter.is_some_and(|f| f != remote) {
                continue;
            }
            let prefix = format!("{remote}/");
            let mut branches: BTreeMap<String, RecordSet> = BTreeMap::new();
            let mut head_target: Option<String> = None;

            for line in &lines {
                let Some(rest) = line.strip_prefix(&prefix) else {
                    continue;
                };
                if let Some((_, target)) = rest.split_once(" -> ") {
                    let target = target.strip_prefix(&prefix).unwrap_or(target);
                    head_target = Some(target.to_owned());
                    continue;
                }
                let records = self.handle_records(&format!("{remote}/{rest}"))?;
                branches.insert(rest.to_owned(), records);
            }

            if let Some(target) = head_target {
                match branches.get(&target) {
                    Some(records) => {
                        branches.insert("HEAD".to_owned(), records.clone());
                    }
                    None => return Err(RepoError::RemoteHeadUnresolved { remote, target }),
                }
            } else {
                debug!(remote = %remote, "no HEAD pointer advertised");
            }

            remotes.insert(remote, branches);
        }
        Ok(remotes)
    }

    /// Persists `records` as the complete record set of `branch` (`"HEAD"`
    /// resolves to the active branch) in a single commit.
    ///
    /// Record files no longer present in `records` are removed; the
    /// `collection` file is never part of this diff. Committing to the
    /// active branch rewrites the working tree; committing to any other
    /// branch constructs the commit directly and leaves the working tree
    /// alone.
    pub fn commit_records(
        &self,
        records: &RecordSet,
        branch: &str,
        message: &str,
    ) -> Result<(), RepoError> {
        let active = self.vcs.active_branch()?;
        let target = if branch == "HEAD" {
            active.clone()
        } else {
            branch.to_owned()
        };

        let mut encoded = TreeFiles::new();
        for (key, record) in records {
            let filename = self.mapping.key_to_filename(key);
            let content = record
                .encode()
                .map_err(|source| RepoError::MalformedRecord {
                    path: filename.clone(),
                    source,
                })?;
            encoded.insert(filename, content);
        }

        if target == active {
            let keep: BTreeSet<&str> = encoded.keys().map(String::as_str).collect();
            for gone in self.vcs.tracked_files(None)? {
                if gone != COLLECTION_FILE && !keep.contains(gone.as_str()) {
                    self.vcs.untrack(&gone)?;
                }
            }
            for (filename, content) in &encoded {
                self.vcs.write_file(filename, content)?;
            }
            let to_track: Vec<&str> = encoded.keys().map(String::as_str).collect();
            self.vcs.track(&to_track)?;
            self.vcs.commit(message)?;
        } else {
            // The target branch may not exist yet; fall back to this
            // repository's own metadata file in that case.
            let collection_file = self
                .vcs
                .read_file(COLLECTION_FILE, Some(&target))
                .unwrap_or_else(|_| format!("{NAME_LABEL}{}\n", self.name));
            encoded.insert(COLLECTION_FILE.to_owned(), collection_file);
            self.vcs.commit_tree(&target, &encoded, message)?;
        }
        Ok(())
    }

    /// Writes one record file on the active branch and commits
    /// immediately. Returns the name the record was stored under; when
    /// `name` is absent it derives from the last path segment of the
    /// record's location.
    pub fn add_record(
        &self,
        record: &HandleRecord,
        name: Option<&str>,
    ) -> Result<String, RepoError> {
        let name = match name {
            Some(name) => name.to_owned(),
            None => location_basename(&record.location),
        };
        let filename = self.mapping.key_to_filename(&name);
        let content = record
            .encode()
            .map_err(|source| RepoError::MalformedRecord {
                path: filename.clone(),
                source,
            })?;
        self.vcs.write_file(&filename, &content)?;
        self.vcs.track(&[&filename])?;
        self.vcs.commit(&format!("Add handle {name}."))?;
        Ok(name)
    }

    /// Untracks one record file on the active branch and commits
    /// immediately.
    pub fn remove_record(&self, name: &str) -> Result<(), RepoError> {
        self.vcs.untrack(&self.mapping.key_to_filename(name))?;
        self.vcs.commit(&format!("Removed handle {name}."))?;
        Ok(())
    }

    /// Shares this repository for use by snapshots and aggregators.
    pub fn into_shared(self) -> Rc<Self> {
        Rc::new(self)
    }

    /// Releases the backing store, e.g. to reopen it.
    pub fn into_vcs(self) -> V {
        self.vcs
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn location_basename(location: &str) -> String {
    let trimmed = location.trim_end_matches('/');
    match trimmed.rsplit('/').next() {
        Some(segment) if !segment.is_empty() => segment.to_owned(),
        _ => trimmed.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::memory::MemoryVcs;

    fn fresh_repo() -> CollectionRepo<MemoryVcs> {
        CollectionRepo::open(MemoryVcs::new("/mem/catalog"), None).expect("open")
    }

    #[test]
    fn initializes_with_directory_basename() {
        let repo = fresh_repo();
        assert_eq!(repo.name(), "catalog");

        let stored = repo.vcs().read_file(COLLECTION_FILE, None).expect("read");
        assert_eq!(stored, "collection name = catalog\n");
        assert_eq!(&stored[..NAME_LABEL.len()], NAME_LABEL);
        assert_eq!(NAME_LABEL.len(), 18);
    }

    #[test]
    fn reopen_reads_name_and_does_not_recommit() {
        let repo =
            CollectionRepo::open(MemoryVcs::new("/mem/somewhere"), Some("observatory")).expect("open");
        assert_eq!(repo.name(), "observatory");
        let commits = repo.vcs().log().len();

        // reopen over the same backing state; the given name is ignored
        let repo =
            CollectionRepo::open(repo.into_vcs(), Some("ignored on reopen")).expect("reopen");
        assert_eq!(repo.name(), "observatory");
        assert_eq!(repo.vcs().log().len(), commits);
    }

    #[test]
    fn missing_collection_file_is_broken() {
        let vcs = MemoryVcs::new("/mem/broken");
        vcs.write_file("stray", "content").unwrap();
        vcs.track(&["stray"]).unwrap();
        vcs.commit("stray only").unwrap();

        let err = CollectionRepo::open(vcs, None).unwrap_err();
        assert!(matches!(err, RepoError::BrokenCollection));
    }

    #[test]
    fn add_reload_remove_scenario() {
        let repo = fresh_repo();
        let record = HandleRecord::seed("abc123", "/data/alpha", "urn:cairn:alpha");
        let name = repo.add_record(&record, None).expect("add");
        assert_eq!(name, "alpha");

        let records = repo.handle_records("HEAD").expect("reload");
        assert_eq!(records.len(), 1);
        assert_eq!(records["alpha"].id, "abc123");
        assert_eq!(records["alpha"].location, "/data/alpha");

        repo.remove_record("alpha").expect("remove");
        assert!(repo.handle_records("HEAD").expect("reload").is_empty());
    }

    #[test]
    fn malformed_record_file_carries_path() {
        let repo = fresh_repo();
        repo.vcs().write_file("bad", "not a record\n").unwrap();
        repo.vcs().track(&["bad"]).unwrap();
        repo.vcs().commit("bad record").unwrap();

        let err = repo.handle_records("HEAD").unwrap_err();
        match err {
            RepoError::MalformedRecord { path, .. } => assert_eq!(path, "bad"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn location_basename_variants() {
        assert_eq!(location_basename("/data/alpha"), "alpha");
        assert_eq!(location_basename("/data/alpha/"), "alpha");
        assert_eq!(location_basename("alpha"), "alpha");
        assert_eq!(location_basename("http://host/store/beta"), "beta");
    }
}
