//! Resource provider frontend API model.
//!
//! The frontend accepts ARM-style requests against OpenShift cluster resources and records every
//! long-running mutation as an [`AsyncOperation`]. The types here are the persisted documents and
//! the error kinds the API layer returns:
//!
//! - An [`OpenShiftClusterDocument`] is keyed by the lower-cased resource path and carries the
//!   cluster's provisioning state plus a back-reference to the operation currently acting on it.
//! - An [`AsyncOperationDocument`] tracks one long-running mutation. It references (but does not
//!   own) the cluster document and outlives it, so that a client polling after a delete still gets
//!   an answer.
//! - [`OpenShiftVersionDocument`] and [`PlatformWorkloadIdentityRoleSetDocument`] are reference
//!   data, mirrored into in-memory caches from the document store's change feed.

#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

mod async_operation;
mod cluster;
mod error;
mod provisioning;
mod reference;
mod resource_id;
mod subscription;
pub mod version;

pub use self::{
    async_operation::{operation_path, AsyncOperation, AsyncOperationDocument, OperationStatus},
    cluster::{ClusterProfile, OpenShiftCluster, OpenShiftClusterDocument, OpenShiftClusterProperties},
    error::{code, CloudError, CloudErrorBody, Error},
    provisioning::ProvisioningState,
    reference::{
        OpenShiftVersion, OpenShiftVersionDocument, OpenShiftVersionProperties,
        PlatformWorkloadIdentityRole, PlatformWorkloadIdentityRoleSet,
        PlatformWorkloadIdentityRoleSetDocument, PlatformWorkloadIdentityRoleSetProperties,
    },
    resource_id::{ParseError, ResourceId},
    subscription::{
        RegisteredFeatureProfile, Subscription, SubscriptionDocument, SubscriptionProperties,
        SubscriptionState,
    },
};

/// The resource type of OpenShift clusters, relative to the provider namespace.
pub const OPENSHIFT_CLUSTERS_TYPE: &str = "openShiftClusters";

/// Subscription feature that permits installing any valid semantic version.
pub const FEATURE_ARBITRARY_VERSIONS: &str = "Microsoft.RedHatOpenShift/ArbitraryVersions";
