//! A branch-scoped snapshot of a collection.
//!
//! A [`Collection`] is a detached, owned copy of one branch's record set
//! plus the joined metadata graph over it: a collection node typed as a
//! collection, every handle's own graph, and one `contains` edge per
//! handle. The snapshot is never assumed fresh: mutate it in memory, then
//! [`Collection::commit`] the batch as one commit, or [`Collection::reload`]
//! to resynchronize with the repository.

use std::collections::BTreeMap;
use std::rc::Rc;

use itertools::Itertools;
use thiserror::Error;
use tracing::error;

use crate::graph::{ns, Graph, NtParseError, Term, Triple};
use crate::record::HandleRecord;
use crate::repo::{CollectionRepo, IdentityMapping, KeyMapping, RecordSet, RepoError};
use crate::vcs::Vcs;

#[derive(Debug, Error)]
pub enum CollectionError {
    /// The operation needs a backing repository, but this snapshot is
    /// detached (copied or freshly constructed).
    #[error("collection snapshot has no backing repository")]
    MissingRepository,
    /// A handle's metadata payload is not a well-formed graph. The raw
    /// payload is carried for diagnosis.
    #[error("metadata of handle {name:?} does not parse: {source}\n--- payload ---\n{payload}")]
    MetadataParse {
        name: String,
        payload: String,
        #[source]
        source: NtParseError,
    },
    /// A handle's metadata graph declares no handle-typed node.
    #[error("metadata of handle {name:?} declares no handle node")]
    MissingHandleNode { name: String },
    /// A handle's metadata graph declares more than one handle-typed node.
    #[error("metadata of handle {name:?} declares more than one handle node")]
    AmbiguousHandleNode { name: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One branch's records and their joined metadata graph.
#[derive(Debug)]
pub struct Collection<V: Vcs, M: KeyMapping = IdentityMapping> {
    repo: Option<Rc<CollectionRepo<V, M>>>,
    branch: String,
    records: RecordSet,
    meta: Graph,
    handle_nodes: BTreeMap<String, Term>,
}

impl<V: Vcs, M: KeyMapping> Collection<V, M> {
    /// An empty, detached snapshot with an empty joined graph.
    pub fn new(branch: impl Into<String>) -> Self {
        Collection {
            repo: None,
            branch: branch.into(),
            records: RecordSet::new(),
            meta: Graph::new(),
            handle_nodes: BTreeMap::new(),
        }
    }

    /// Loads the snapshot of `branch` from `repo`.
    pub fn load(
        repo: Rc<CollectionRepo<V, M>>,
        branch: impl Into<String>,
    ) -> Result<Self, CollectionError> {
        let mut collection = Collection {
            repo: Some(repo),
            branch: branch.into(),
            records: RecordSet::new(),
            meta: Graph::new(),
            handle_nodes: BTreeMap::new(),
        };
        collection.reload()?;
        Ok(collection)
    }

    /// A detached copy of another snapshot: same records, same joined
    /// graph, no backing repository.
    pub fn copy_of(other: &Self) -> Self {
        Collection {
            repo: None,
            branch: other.branch.clone(),
            records: other.records.clone(),
            meta: other.meta.clone(),
            handle_nodes: other.handle_nodes.clone(),
        }
    }

    /// Wraps an already-loaded record set (e.g. a remote branch's) as a
    /// detached snapshot, building its joined graph under
    /// `collection_iri`.
    pub fn from_records(
        records: RecordSet,
        collection_iri: &str,
        branch: impl Into<String>,
    ) -> Result<Self, CollectionError> {
        let (meta, handle_nodes) = join_records(&records, collection_iri)?;
        Ok(Collection {
            repo: None,
            branch: branch.into(),
            records,
            meta,
            handle_nodes,
        })
    }

    /// Re-reads the record set from the backing repository and rebuilds
    /// the joined graph from scratch.
    pub fn reload(&mut self) -> Result<(), CollectionError> {
        let repo = self.repo.as_ref().ok_or(CollectionError::MissingRepository)?;
        let records = repo.handle_records(&self.branch)?;
        let (meta, handle_nodes) = join_records(&records, &repo.collection_iri())?;
        self.records = records;
        self.meta = meta;
        self.handle_nodes = handle_nodes;
        Ok(())
    }

    /// Persists the in-memory record set to the snapshot's branch as one
    /// commit via the backing repository.
    pub fn commit(&self, message: &str) -> Result<(), CollectionError> {
        let repo = self.repo.as_ref().ok_or_else(|| {
            error!(branch = %self.branch, "commit attempted on a detached snapshot");
            CollectionError::MissingRepository
        })?;
        repo.commit_records(&self.records, &self.branch, message)?;
        Ok(())
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The backing repository, when this snapshot has one.
    pub fn repo(&self) -> Option<&Rc<CollectionRepo<V, M>>> {
        self.repo.as_ref()
    }

    /// The joined metadata graph as of the last reload.
    pub fn meta(&self) -> &Graph {
        &self.meta
    }

    /// The node a handle's metadata declares, as of the last reload.
    pub fn handle_node(&self, name: &str) -> Option<&Term> {
        self.handle_nodes.get(name)
    }

    pub fn handle_nodes(&self) -> impl Iterator<Item = (&String, &Term)> {
        self.handle_nodes.iter()
    }

    pub fn records(&self) -> &RecordSet {
        &self.records
    }

    // Mapping facade. Staged changes affect the record set only; the
    // joined graph reflects the last reload.

    pub fn insert(&mut self, name: impl Into<String>, record: HandleRecord) -> Option<HandleRecord> {
        self.records.insert(name.into(), record)
    }

    pub fn remove(&mut self, name: &str) -> Option<HandleRecord> {
        self.records.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&HandleRecord> {
        self.records.get(name)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &HandleRecord)> {
        self.records.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.records.keys()
    }
}

impl<'a, V: Vcs, M: KeyMapping> IntoIterator for &'a Collection<V, M> {
    type Item = (&'a String, &'a HandleRecord);
    type IntoIter = std::collections::btree_map::Iter<'a, String, HandleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Builds the joined graph over `records`: the collection node, every
/// handle graph, and one `contains` edge per handle. Also returns the
/// handle-node index.
fn join_records(
    records: &RecordSet,
    collection_iri: &str,
) -> Result<(Graph, BTreeMap<String, Term>), CollectionError> {
    let collection_node = Term::iri(collection_iri);
    let mut meta = Graph::new();
    meta.insert(Triple::new(
        collection_node.clone(),
        ns::rdf_type(),
        ns::collection(),
    ));

    let mut handle_nodes = BTreeMap::new();
    for (name, record) in records {
        let graph = record.metadata_graph().map_err(|source| {
            error!(handle = %name, payload = %record.metadata, "handle metadata failed to parse");
            CollectionError::MetadataParse {
                name: name.clone(),
                payload: record.metadata.clone(),
                source,
            }
        })?;

        let node = match graph
            .subjects_with(&ns::rdf_type(), &ns::handle())
            .at_most_one()
        {
            Ok(Some(node)) => node.clone(),
            Ok(None) => {
                return Err(CollectionError::MissingHandleNode { name: name.clone() })
            }
            Err(_) => {
                return Err(CollectionError::AmbiguousHandleNode { name: name.clone() })
            }
        };

        meta += graph;
        meta.insert(Triple::new(
            collection_node.clone(),
            ns::contains(),
            node.clone(),
        ));
        handle_nodes.insert(name.clone(), node);
    }

    Ok((meta, handle_nodes))
}
