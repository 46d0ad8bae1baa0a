use std::fmt;
use thiserror::Error;

/// Identifies a resource by its ARM path,
/// `/subscriptions/{sub}/resourceGroups/{group}/providers/{namespace}/{type}/{name}`.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub provider_namespace: String,
    pub resource_type: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid resource id {0:?}")]
pub struct ParseError(pub String);

// === impl ResourceId ===

impl ResourceId {
    pub fn parse(path: &str) -> Result<Self, ParseError> {
        let segments = path
            .trim_matches('/')
            .split('/')
            .collect::<Vec<_>>();
        match segments[..] {
            [subscriptions, subscription_id, resource_groups, resource_group, providers, provider_namespace, resource_type, name]
                if subscriptions.eq_ignore_ascii_case("subscriptions")
                    && resource_groups.eq_ignore_ascii_case("resourcegroups")
                    && providers.eq_ignore_ascii_case("providers")
                    && [subscription_id, resource_group, provider_namespace, resource_type, name]
                        .iter()
                        .all(|s| !s.is_empty()) =>
            {
                Ok(Self {
                    subscription_id: subscription_id.to_string(),
                    resource_group: resource_group.to_string(),
                    provider_namespace: provider_namespace.to_string(),
                    resource_type: resource_type.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(ParseError(path.to_string())),
        }
    }

    /// The normalized document store key of the resource.
    pub fn key(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// `{namespace}/{type}`, as reported in a resource's `type` field.
    pub fn qualified_type(&self) -> String {
        format!("{}/{}", self.provider_namespace, self.resource_type)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/{}/{}/{}",
            self.subscription_id,
            self.resource_group,
            self.provider_namespace,
            self.resource_type,
            self.name
        )
    }
}

impl std::str::FromStr for ResourceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
