use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftVersionDocument {
    pub id: String,
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub open_shift_version: OpenShiftVersion,
}

/// An installable OpenShift version.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftVersion {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,

    /// Marks a version that is being removed. The change feed reports such documents one last
    /// time rather than having them disappear.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleting: bool,

    pub properties: OpenShiftVersionProperties,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenShiftVersionProperties {
    pub version: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub default: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub open_shift_pullspec: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub installer_pullspec: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformWorkloadIdentityRoleSetDocument {
    pub id: String,
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub platform_workload_identity_role_set: PlatformWorkloadIdentityRoleSet,
}

/// The operator roles a workload-identity cluster of a given minor version requires.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformWorkloadIdentityRoleSet {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub type_: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleting: bool,
    pub properties: PlatformWorkloadIdentityRoleSetProperties,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformWorkloadIdentityRoleSetProperties {
    pub open_shift_version: String,
    #[serde(default)]
    pub platform_workload_identity_roles: Vec<PlatformWorkloadIdentityRole>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformWorkloadIdentityRole {
    pub operator_name: String,
    pub role_definition_name: String,
    pub role_definition_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub service_accounts: Vec<String>,
}
