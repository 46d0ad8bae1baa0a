use crate::ChangefeedCache;
use rp_frontend_core::{code, version, CloudError, Error, OpenShiftVersion, OpenShiftVersionDocument};
use std::collections::HashMap;

const VERSION_TARGET: &str = "properties.clusterProfile.version";

/// The installable OpenShift versions, keyed by version string.
///
/// A version is present only while it is enabled and not being deleted.
#[derive(Debug, Default)]
pub struct EnabledVersions {
    versions: HashMap<String, OpenShiftVersion>,
    default: Option<String>,
}

// === impl EnabledVersions ===

impl EnabledVersions {
    pub fn get(&self, version: &str) -> Option<&OpenShiftVersion> {
        self.versions.get(version)
    }

    /// The version installed when a request does not name one.
    pub fn default_version(&self) -> Option<&OpenShiftVersion> {
        self.default.as_ref().and_then(|v| self.versions.get(v))
    }

    /// Returns all enabled versions in ascending version order.
    pub fn list(&self) -> Vec<OpenShiftVersion> {
        let mut versions = self.versions.values().cloned().collect::<Vec<_>>();
        versions.sort_by(|a, b| version::compare(&a.properties.version, &b.properties.version));
        versions
    }

    /// Resolves the version a new cluster installs.
    ///
    /// An empty request resolves to the default version. Otherwise the version must be enabled,
    /// unless `allow_arbitrary` is set, in which case any valid semantic version is accepted.
    pub fn resolve_install_version(
        &self,
        requested: &str,
        allow_arbitrary: bool,
    ) -> Result<String, Error> {
        let version = if requested.is_empty() {
            match self.default_version() {
                Some(v) => v.properties.version.clone(),
                None => {
                    return Err(Error::InvalidState(CloudError::new(
                        http::StatusCode::INTERNAL_SERVER_ERROR,
                        code::INTERNAL_SERVER_ERROR,
                        VERSION_TARGET,
                        "No default OpenShift version is available. Please specify a version explicitly using the --version parameter.",
                    )))
                }
            }
        } else {
            requested.to_string()
        };

        if allow_arbitrary {
            if !version::is_valid(&version) {
                return Err(Error::bad_request(
                    code::INVALID_PARAMETER,
                    VERSION_TARGET,
                    format!("The requested OpenShift version '{version}' is not a valid semantic version."),
                ));
            }
            return Ok(version);
        }

        if !self.versions.contains_key(&version) || !version::is_valid(&version) {
            return Err(Error::bad_request(
                code::INVALID_PARAMETER,
                VERSION_TARGET,
                format!("The requested OpenShift version '{version}' is invalid."),
            ));
        }
        Ok(version)
    }
}

impl ChangefeedCache<OpenShiftVersionDocument> for EnabledVersions {
    fn apply(&mut self, doc: OpenShiftVersionDocument) {
        let version = doc.open_shift_version;
        let key = version.properties.version.clone();

        if version.deleting || !version.properties.enabled {
            self.versions.remove(&key);
            if self.default.as_ref() == Some(&key) {
                self.default = None;
            }
            return;
        }

        if version.properties.default {
            self.default = Some(key.clone());
        } else if self.default.as_ref() == Some(&key) {
            self.default = None;
        }
        self.versions.insert(key, version);
    }

    fn len(&self) -> usize {
        self.versions.len()
    }
}
