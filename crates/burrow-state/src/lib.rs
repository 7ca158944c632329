//! Burrow persistence layer.
//!
//! Record types, store trait contracts, in-memory fakes for testing, and
//! the SurrealDB-backed implementation.

pub mod error;
pub mod fakes;
pub mod migrations;
pub mod records;
pub mod stores;
pub mod surreal;

pub use error::{StateError, StateResult};
pub use fakes::{
    MemoryBatchStore, MemoryInstallationStore, MemoryLockStore, MemoryRepoStore,
};
pub use records::{
    canonical_repo_name, lock_namespace, AppRecord, BatchRecord, BatchStatus, BatchType,
    InstallationLinkRecord, InstallationRepoRecord, JobRecord, JobStatus, LockRecord,
    OrganizationRecord, RepoRecord, VcsKind,
};
pub use stores::{BatchStore, InstallationStore, LockStore, RepoStore};
pub use surreal::SurrealStores;
