//! A versioned metadata catalog on top of a version-control backend.
//!
//! A catalog is an ordinary VCS repository whose tracked files are handle
//! records: small, line-oriented descriptions of external datasets, each
//! carrying an RDF metadata graph. [`repo::CollectionRepo`] owns the
//! persistence rules, [`collection::Collection`] materializes one branch
//! as a queryable snapshot, and [`aggregate::MasterCollection`] folds
//! every local and remote branch into a single graph.
//!
//! Storage is pluggable through the [`vcs::Vcs`] trait; [`vcs::git::GitVcs`]
//! drives the `git` CLI and [`vcs::memory::MemoryVcs`] keeps everything in
//! memory for tests and ephemeral catalogs.

pub mod aggregate;
pub mod collection;
pub mod graph;
pub mod record;
pub mod repo;
pub mod vcs;

pub mod prelude;
