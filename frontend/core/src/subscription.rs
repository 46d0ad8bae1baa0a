use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionDocument {
    pub id: String,
    #[serde(rename = "_etag", default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    pub subscription: Subscription,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub state: SubscriptionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<SubscriptionProperties>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionProperties {
    #[serde(default, rename = "tenantId")]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub registered_features: Vec<RegisteredFeatureProfile>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredFeatureProfile {
    pub name: String,
    pub state: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionState {
    #[default]
    Registered,
    Unregistered,
    Warned,
    Suspended,
    Deleted,
}

// === impl Subscription ===

impl Subscription {
    pub fn has_registered_feature(&self, name: &str) -> bool {
        self.properties.iter().any(|p| {
            p.registered_features
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(name) && f.state == "Registered")
        })
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Registered => "Registered",
            Self::Unregistered => "Unregistered",
            Self::Warned => "Warned",
            Self::Suspended => "Suspended",
            Self::Deleted => "Deleted",
        };
        f.write_str(s)
    }
}
