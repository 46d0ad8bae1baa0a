use rp_frontend_database::RetryPolicy;

/// Process-wide frontend settings, shared by every request handler.
#[derive(Clone, Debug)]
pub struct FrontendConfig {
    /// The Azure region served by this process, always lower case.
    pub location: String,

    pub resource_provider_namespace: String,

    /// Permits installing any valid semantic version, not just enabled ones.
    pub local_development: bool,

    pub retry: RetryPolicy,
}

impl FrontendConfig {
    pub fn new(location: &str, resource_provider_namespace: impl Into<String>) -> Self {
        Self {
            location: location.to_lowercase(),
            resource_provider_namespace: resource_provider_namespace.into(),
            local_development: false,
            retry: RetryPolicy::default(),
        }
    }
}
