//! Change feed driven caches of reference data.
//!
//! Each cache is owned by a [`Synchronizer`] task that drains the collection's change feed on a
//! fixed interval and applies every batch under the cache's write lock. Request handlers only
//! ever take the read lock, so a reader waits for at most one batch.
//!
//! Deletion is reported through the feed as a flag on the document rather than by the document
//! disappearing: a version that is being deleted or is disabled, or a role set that is being
//! deleted, is removed from its cache.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod metrics;
mod role_sets;
mod synchronizer;
mod versions;


pub use self::{
    metrics::CacheMetrics,
    role_sets::RoleSets,
    synchronizer::{ChangefeedCache, LastSync, SharedCache, Synchronizer},
    versions::EnabledVersions,
};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedVersions = SharedCache<EnabledVersions>;
pub type SharedRoleSets = SharedCache<RoleSets>;

impl EnabledVersions {
    pub fn shared() -> SharedVersions {
        Arc::new(RwLock::new(Self::default()))
    }
}

impl RoleSets {
    pub fn shared() -> SharedRoleSets {
        Arc::new(RwLock::new(Self::default()))
    }
}
