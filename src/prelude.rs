pub use crate::aggregate::{AggregatePolicy, HandleHit, MasterCollection};
pub use crate::collection::{Collection, CollectionError};
pub use crate::graph::{Graph, Term, TermPattern, Triple, TriplePattern};
pub use crate::record::{HandleRecord, MalformedRecordError};
pub use crate::repo::{CollectionRepo, KeyMapping, RecordSet, RepoError};
pub use crate::vcs::git::{Committer, GitVcs};
pub use crate::vcs::memory::MemoryVcs;
pub use crate::vcs::{Vcs, VcsError};
