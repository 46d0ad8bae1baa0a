//! Document store access for the frontend.
//!
//! The store is an optimistic-concurrency document database: every write returns a new etag and
//! conditional writes against a stale etag fail with [`Error::PreconditionFailed`]. Mutations go
//! through [`Collection::patch`], which re-reads the document and re-applies the mutation until
//! it commits or the [`RetryPolicy`] is exhausted.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod client;
mod collection;
mod error;
pub mod memory;
mod retry;

pub use self::{
    client::{Document, DocumentClient, DocumentIterator, Page},
    collection::{
        AsyncOperations, Collection, Database, MemoryDatabase, OpenShiftClusters,
        OpenShiftVersions, PlatformWorkloadIdentityRoleSets, Subscriptions,
    },
    error::{Error, Result},
    retry::{RetryPolicy, Retryable},
};
