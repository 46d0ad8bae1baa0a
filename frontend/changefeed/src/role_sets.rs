use crate::ChangefeedCache;
use rp_frontend_core::{
    version, PlatformWorkloadIdentityRoleSet, PlatformWorkloadIdentityRoleSetDocument,
};
use std::collections::HashMap;

/// The platform workload identity role sets, keyed by the OpenShift minor version they apply to.
#[derive(Debug, Default)]
pub struct RoleSets {
    role_sets: HashMap<String, PlatformWorkloadIdentityRoleSet>,
}

impl RoleSets {
    pub fn get(&self, version: &str) -> Option<&PlatformWorkloadIdentityRoleSet> {
        self.role_sets.get(version)
    }

    pub fn list(&self) -> Vec<PlatformWorkloadIdentityRoleSet> {
        let mut role_sets = self.role_sets.values().cloned().collect::<Vec<_>>();
        role_sets.sort_by(|a, b| {
            version::compare(
                &a.properties.open_shift_version,
                &b.properties.open_shift_version,
            )
        });
        role_sets
    }
}

impl ChangefeedCache<PlatformWorkloadIdentityRoleSetDocument> for RoleSets {
    fn apply(&mut self, doc: PlatformWorkloadIdentityRoleSetDocument) {
        let role_set = doc.platform_workload_identity_role_set;
        let key = role_set.properties.open_shift_version.clone();
        if role_set.deleting {
            self.role_sets.remove(&key);
        } else {
            self.role_sets.insert(key, role_set);
        }
    }

    fn len(&self) -> usize {
        self.role_sets.len()
    }
}
