use crate::ProvisioningState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The persisted form of a cluster resource.
///
/// `key` is the lower-cased resource path and is unique across the collection.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftClusterDocument {
    pub id: String,
    pub key: String,

    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Number of times a worker has dequeued the document for the current operation.
    #[serde(default)]
    pub dequeues: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_owner: Option<String>,

    /// The operation currently acting on the cluster, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_operation_id: Option<String>,

    pub open_shift_cluster: OpenShiftCluster,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenShiftCluster {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    pub properties: OpenShiftClusterProperties,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OpenShiftClusterProperties {
    pub provisioning_state: ProvisioningState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_provisioning_state: Option<ProvisioningState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_provisioning_state: Option<ProvisioningState>,

    #[serde(default)]
    pub cluster_profile: ClusterProfile,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterProfile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, rename = "resourceGroupId", skip_serializing_if = "String::is_empty")]
    pub resource_group_id: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pull_secret: String,
}

// === impl OpenShiftClusterDocument ===

impl OpenShiftClusterDocument {
    pub fn provisioning_state(&self) -> ProvisioningState {
        self.open_shift_cluster.properties.provisioning_state
    }

    /// Returns true if `operation_id` is the operation still acting on this cluster.
    pub fn is_operation_in_flight(&self, operation_id: &str) -> bool {
        self.async_operation_id.as_deref() == Some(operation_id)
    }
}

// === impl OpenShiftCluster ===

impl OpenShiftCluster {
    /// Returns the representation handed to API clients, with secrets removed.
    pub fn to_external(&self) -> Self {
        let mut oc = self.clone();
        oc.properties.cluster_profile.pull_secret.clear();
        oc
    }
}

impl Default for OpenShiftClusterProperties {
    fn default() -> Self {
        Self {
            provisioning_state: ProvisioningState::Succeeded,
            last_provisioning_state: None,
            failed_provisioning_state: None,
            cluster_profile: ClusterProfile::default(),
            created_at: None,
        }
    }
}
