//! The master collection: every branch of a collection repository, local
//! and remote, folded into one queryable view.
//!
//! Assembly walks the repository's local branches and configured remotes,
//! materializes one [`Collection`] per branch (remote branches become
//! detached snapshots) and unions every joined graph into a single
//! aggregate. The aggregate is derived state: it is rebuilt on
//! [`MasterCollection::refresh`], never persisted.
//!
//! Whether a failing remote aborts assembly or degrades the aggregate is
//! an explicit choice ([`AggregatePolicy`]); a degraded aggregate always
//! surfaces what it is missing through [`MasterCollection::failures`].

use std::collections::BTreeMap;
use std::rc::Rc;

use tracing::warn;

use crate::collection::{Collection, CollectionError};
use crate::graph::{Graph, Term, TriplePattern};
use crate::repo::{CollectionRepo, IdentityMapping, KeyMapping};
use crate::vcs::Vcs;

/// How assembly treats a remote whose enumeration or loading fails.
///
/// Local-branch failures abort under either policy: a local branch that
/// cannot load means the repository itself is broken, not that a peer is
/// unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregatePolicy {
    /// Any failure aborts assembly.
    #[default]
    Strict,
    /// A failing remote is skipped and recorded in
    /// [`MasterCollection::failures`].
    Degrade,
}

/// A remote that could not be folded into the aggregate.
#[derive(Debug)]
pub struct AggregateFailure {
    pub remote: String,
    pub error: CollectionError,
}

/// One query match: a handle plus where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleHit {
    /// `None` for a local branch.
    pub remote: Option<String>,
    pub branch: String,
    pub name: String,
    pub node: Term,
}

/// All local and remote branches of one collection repository, with their
/// metadata joined into a single graph.
#[derive(Debug)]
pub struct MasterCollection<V: Vcs, M: KeyMapping = IdentityMapping> {
    repo: Rc<CollectionRepo<V, M>>,
    locals: BTreeMap<String, Collection<V, M>>,
    remotes: BTreeMap<String, BTreeMap<String, Collection<V, M>>>,
    graph: Graph,
    policy: AggregatePolicy,
    failures: Vec<AggregateFailure>,
}

impl<V: Vcs, M: KeyMapping> MasterCollection<V, M> {
    /// Assembles the aggregate under [`AggregatePolicy::Strict`].
    pub fn new(repo: Rc<CollectionRepo<V, M>>) -> Result<Self, CollectionError> {
        Self::assemble(repo, AggregatePolicy::Strict)
    }

    pub fn assemble(
        repo: Rc<CollectionRepo<V, M>>,
        policy: AggregatePolicy,
    ) -> Result<Self, CollectionError> {
        let mut master = MasterCollection {
            repo,
            locals: BTreeMap::new(),
            remotes: BTreeMap::new(),
            graph: Graph::new(),
            policy,
            failures: Vec::new(),
        };
        master.rebuild_all()?;
        Ok(master)
    }

    /// Re-derives the named scope and recomputes the aggregate graph.
    ///
    /// `(None, None)` rebuilds everything; `(None, Some(branch))` reloads
    /// one local branch; `(Some(remote), _)` re-enumerates that remote
    /// (all of its branches, since remote discovery is one operation).
    pub fn refresh(
        &mut self,
        remote: Option<&str>,
        branch: Option<&str>,
    ) -> Result<(), CollectionError> {
        match (remote, branch) {
            (None, None) => return self.rebuild_all(),
            (None, Some(branch)) => {
                let collection = Collection::load(self.repo.clone(), branch)?;
                self.locals.insert(branch.to_owned(), collection);
            }
            (Some(remote), _) => {
                self.load_remotes(Some(remote))?;
            }
        }
        self.rejoin();
        Ok(())
    }

    /// Evaluates `pattern` against every collection and returns the
    /// handles whose own subgraph matches, with provenance.
    pub fn query(&self, pattern: &TriplePattern) -> Vec<HandleHit> {
        let mut hits = Vec::new();
        for (branch, collection) in &self.locals {
            collect_hits(None, branch, collection, pattern, &mut hits);
        }
        for (remote, branches) in &self.remotes {
            for (branch, collection) in branches {
                collect_hits(Some(remote), branch, collection, pattern, &mut hits);
            }
        }
        hits
    }

    /// The aggregate graph over every branch, local and remote.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn repo(&self) -> &Rc<CollectionRepo<V, M>> {
        &self.repo
    }

    pub fn policy(&self) -> AggregatePolicy {
        self.policy
    }

    /// Remotes skipped during degraded assembly. Empty under
    /// [`AggregatePolicy::Strict`].
    pub fn failures(&self) -> &[AggregateFailure] {
        &self.failures
    }

    pub fn local(&self, branch: &str) -> Option<&Collection<V, M>> {
        self.locals.get(branch)
    }

    pub fn locals(&self) -> impl Iterator<Item = (&String, &Collection<V, M>)> {
        self.locals.iter()
    }

    pub fn remote(&self, remote: &str, branch: &str) -> Option<&Collection<V, M>> {
        self.remotes.get(remote)?.get(branch)
    }

    pub fn remotes(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, Collection<V, M>>)> {
        self.remotes.iter()
    }

    fn rebuild_all(&mut self) -> Result<(), CollectionError> {
        let mut locals = BTreeMap::new();
        for branch in self.repo.vcs().branches().map_err(crate::repo::RepoError::from)? {
            let collection = Collection::load(self.repo.clone(), &branch)?;
            locals.insert(branch, collection);
        }
        self.load_remotes(None)?;
        self.locals = locals;
        self.rejoin();
        Ok(())
    }

    /// Loads every remote (or just `filter`), honoring the policy.
    ///
    /// Everything in scope is staged before any field changes, so a failed
    /// load leaves the previous aggregate intact: maps, failures and graph
    /// keep agreeing with each other.
    fn load_remotes(&mut self, filter: Option<&str>) -> Result<(), CollectionError> {
        let names = self
            .repo
            .vcs()
            .remotes()
            .map_err(crate::repo::RepoError::from)?;

        let mut loaded = BTreeMap::new();
        let mut failed = Vec::new();
        for remote in names {
            if filter.is_some_and(|f| f != remote) {
                continue;
            }
            match self.load_remote(&remote) {
                Ok(branches) => {
                    loaded.insert(remote, branches);
                }
                Err(error) => match self.policy {
                    AggregatePolicy::Strict => return Err(error),
                    AggregatePolicy::Degrade => {
                        warn!(remote = %remote, %error, "skipping remote; aggregate is degraded");
                        failed.push(AggregateFailure { remote, error });
                    }
                },
            }
        }

        match filter {
            Some(filter) => self.failures.retain(|f| f.remote != filter),
            None => {
                self.remotes.clear();
                self.failures.clear();
            }
        }
        self.remotes.extend(loaded);
        for failure in failed {
            self.remotes.remove(&failure.remote);
            self.failures.push(failure);
        }
        Ok(())
    }

    fn load_remote(
        &self,
        remote: &str,
    ) -> Result<BTreeMap<String, Collection<V, M>>, CollectionError> {
        let mut data = self.repo.remote_records(Some(remote))?;
        let records_by_branch = data.remove(remote).unwrap_or_default();

        let base = self.repo.collection_iri();
        let mut branches = BTreeMap::new();
        for (branch, records) in records_by_branch {
            let iri = format!("{base}#{remote}/{branch}");
            let collection = Collection::from_records(records, &iri, branch.clone())?;
            branches.insert(branch, collection);
        }
        Ok(branches)
    }

    fn rejoin(&mut self) {
        let mut graph = Graph::new();
        for collection in self.locals.values() {
            graph += collection.meta();
        }
        for branches in self.remotes.values() {
            for collection in branches.values() {
                graph += collection.meta();
            }
        }
        self.graph = graph;
    }
}

fn collect_hits<V: Vcs, M: KeyMapping>(
    remote: Option<&str>,
    branch: &str,
    collection: &Collection<V, M>,
    pattern: &TriplePattern,
    hits: &mut Vec<HandleHit>,
) {
    for (name, node) in collection.handle_nodes() {
        let matched = collection
            .meta()
            .triples_matching(pattern)
            .any(|t| &t.subject == node);
        if matched {
            hits.push(HandleHit {
                remote: remote.map(str::to_owned),
                branch: branch.to_owned(),
                name: name.clone(),
                node: node.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ns, TermPattern};
    use crate::record::HandleRecord;
    use crate::repo::{RecordSet, NAME_LABEL};
    use crate::vcs::memory::MemoryVcs;
    use crate::vcs::TreeFiles;

    fn remote_tree(entries: &[(&str, &HandleRecord)]) -> TreeFiles {
        let mut tree = TreeFiles::new();
        tree.insert(
            "collection".to_owned(),
            format!("{NAME_LABEL}peer\n"),
        );
        for (name, record) in entries {
            tree.insert((*name).to_owned(), record.encode().expect("encode"));
        }
        tree
    }

    fn seeded_repo(path: &str) -> Rc<CollectionRepo<MemoryVcs>> {
        let repo = CollectionRepo::open(MemoryVcs::new(path), None)
            .expect("open")
            .into_shared();
        repo.add_record(
            &HandleRecord::seed("abc123", "/data/alpha", "urn:cairn:alpha"),
            None,
        )
        .expect("add");
        repo
    }

    #[test]
    fn aggregates_local_and_remote_branches() {
        let repo = seeded_repo("/mem/master");
        let beta = HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta");
        repo.vcs()
            .set_remote_branch("origin", "master", remote_tree(&[("beta", &beta)]));
        repo.vcs().set_remote_head("origin", "master");

        let master = MasterCollection::new(repo.clone()).expect("assemble");

        assert!(master.local("master").is_some());
        assert!(master.remote("origin", "master").is_some());
        // HEAD aliases the pointer target's record set
        assert_eq!(
            master.remote("origin", "HEAD").expect("HEAD").records(),
            master.remote("origin", "master").expect("master").records(),
        );

        // both handles are visible in the aggregate graph
        let rdf_type = ns::rdf_type();
        let handle = ns::handle();
        let handles: Vec<_> = master
            .graph()
            .subjects_with(&rdf_type, &handle)
            .collect();
        assert_eq!(handles.len(), 2);
    }

    #[test]
    fn query_reports_provenance() {
        let repo = seeded_repo("/mem/query");
        let beta = HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta");
        repo.vcs()
            .set_remote_branch("origin", "work", remote_tree(&[("beta", &beta)]));

        let master = MasterCollection::new(repo).expect("assemble");
        let pattern = TriplePattern::new(TermPattern::Any, ns::rdf_type(), ns::handle());
        let hits = master.query(&pattern);

        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|hit| {
            hit.remote.is_none() && hit.branch == "master" && hit.name == "alpha"
        }));
        assert!(hits.iter().any(|hit| {
            hit.remote.as_deref() == Some("origin") && hit.branch == "work" && hit.name == "beta"
        }));

        // a pattern nothing matches
        let pattern = TriplePattern::new(TermPattern::Any, ns::rdf_type(), Term::iri("urn:none"));
        assert!(master.query(&pattern).is_empty());
    }

    #[test]
    fn strict_assembly_aborts_on_bad_remote() {
        let repo = seeded_repo("/mem/strict");
        let mut tree = TreeFiles::new();
        tree.insert("broken".to_owned(), "not a record\n".to_owned());
        repo.vcs().set_remote_branch("flaky", "master", tree);

        assert!(MasterCollection::new(repo).is_err());
    }

    #[test]
    fn degraded_assembly_records_the_failure() {
        let repo = seeded_repo("/mem/degrade");
        let beta = HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta");
        repo.vcs()
            .set_remote_branch("good", "master", remote_tree(&[("beta", &beta)]));
        let mut tree = TreeFiles::new();
        tree.insert("broken".to_owned(), "not a record\n".to_owned());
        repo.vcs().set_remote_branch("flaky", "master", tree);

        let master =
            MasterCollection::assemble(repo, AggregatePolicy::Degrade).expect("assemble");

        assert_eq!(master.failures().len(), 1);
        assert_eq!(master.failures()[0].remote, "flaky");
        assert!(master.remote("good", "master").is_some());
        assert!(master.remote("flaky", "master").is_none());
    }

    #[test]
    fn refresh_picks_up_new_records() {
        let repo = seeded_repo("/mem/refresh");
        let mut master = MasterCollection::new(repo.clone()).expect("assemble");
        assert_eq!(master.local("master").expect("local").len(), 1);

        repo.add_record(
            &HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta"),
            None,
        )
        .expect("add");

        master.refresh(None, Some("master")).expect("refresh");
        assert_eq!(master.local("master").expect("local").len(), 2);
        assert_eq!(
            master
                .graph()
                .subjects_with(&ns::rdf_type(), &ns::handle())
                .count(),
            2
        );
    }

    #[test]
    fn refresh_scoped_to_one_remote() {
        let repo = seeded_repo("/mem/refresh-remote");
        let beta = HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta");
        repo.vcs()
            .set_remote_branch("origin", "master", remote_tree(&[("beta", &beta)]));

        let mut master = MasterCollection::new(repo.clone()).expect("assemble");
        assert_eq!(master.remote("origin", "master").expect("remote").len(), 1);

        let gamma = HandleRecord::seed("0a1b2c", "/data/gamma", "urn:cairn:gamma");
        repo.vcs().set_remote_branch(
            "origin",
            "master",
            remote_tree(&[("beta", &beta), ("gamma", &gamma)]),
        );

        master.refresh(Some("origin"), None).expect("refresh");
        assert_eq!(master.remote("origin", "master").expect("remote").len(), 2);
    }

    #[test]
    fn failed_strict_refresh_keeps_the_previous_aggregate() {
        let repo = seeded_repo("/mem/strict-refresh");
        let beta = HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta");
        repo.vcs()
            .set_remote_branch("origin", "master", remote_tree(&[("beta", &beta)]));

        let mut master = MasterCollection::new(repo.clone()).expect("assemble");
        let before = master.graph().clone();

        // the remote turns bad after the first assembly
        let mut broken = TreeFiles::new();
        broken.insert("beta".to_owned(), "not a record\n".to_owned());
        repo.vcs().set_remote_branch("origin", "master", broken);

        assert!(master.refresh(Some("origin"), None).is_err());

        // every view still reflects the last good snapshot, and they agree
        assert_eq!(master.graph(), &before);
        assert!(master.remote("origin", "master").is_some());
        assert!(master.failures().is_empty());
        let pattern = TriplePattern::new(TermPattern::Any, ns::rdf_type(), ns::handle());
        assert_eq!(master.query(&pattern).len(), 2);
    }

    #[test]
    fn degraded_refresh_replaces_a_stale_failure() {
        let repo = seeded_repo("/mem/degrade-refresh");
        let mut broken = TreeFiles::new();
        broken.insert("beta".to_owned(), "not a record\n".to_owned());
        repo.vcs().set_remote_branch("origin", "master", broken);

        let mut master =
            MasterCollection::assemble(repo.clone(), AggregatePolicy::Degrade).expect("assemble");
        assert_eq!(master.failures().len(), 1);

        // the remote recovers; a refresh drops the stale failure entry
        let beta = HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta");
        repo.vcs()
            .set_remote_branch("origin", "master", remote_tree(&[("beta", &beta)]));
        master.refresh(Some("origin"), None).expect("refresh");

        assert!(master.failures().is_empty());
        assert!(master.remote("origin", "master").is_some());
        let pattern = TriplePattern::new(TermPattern::Any, ns::rdf_type(), ns::handle());
        assert_eq!(master.query(&pattern).len(), 2);
    }

    #[test]
    fn empty_record_sets_still_contribute_collection_nodes() {
        let repo = seeded_repo("/mem/empty-remote");
        repo.vcs()
            .set_remote_branch("origin", "master", remote_tree(&[]));

        let master = MasterCollection::new(repo).expect("assemble");
        let collections = master
            .graph()
            .subjects_with(&ns::rdf_type(), &ns::collection())
            .count();
        // the local branch plus the remote branch
        assert_eq!(collections, 2);
    }

    #[test]
    fn remote_without_head_pointer_has_no_head_entry() {
        let repo = seeded_repo("/mem/nohead");
        let beta = HandleRecord::seed("def456", "/data/beta", "urn:cairn:beta");
        repo.vcs()
            .set_remote_branch("origin", "master", remote_tree(&[("beta", &beta)]));

        let master = MasterCollection::new(repo).expect("assemble");
        assert!(master.remote("origin", "master").is_some());
        assert!(master.remote("origin", "HEAD").is_none());
    }

    #[test]
    fn unresolvable_head_pointer_is_an_error() {
        let repo = seeded_repo("/mem/badhead");
        repo.vcs().set_remote_head("origin", "vanished");

        let err = MasterCollection::new(repo).unwrap_err();
        assert!(matches!(
            err,
            CollectionError::Repo(crate::repo::RepoError::RemoteHeadUnresolved { .. })
        ));
    }

    #[test]
    fn seeding_a_record_set_for_tests() {
        // from_records wraps an arbitrary record mapping without a repo
        let mut records = RecordSet::new();
        records.insert(
            "alpha".to_owned(),
            HandleRecord::seed("abc123", "/data/alpha", "urn:cairn:alpha"),
        );
        let collection =
            Collection::<MemoryVcs>::from_records(records, "urn:cairn:test", "master")
                .expect("wrap");
        assert_eq!(collection.len(), 1);
        assert!(collection.repo().is_none());
    }
}
