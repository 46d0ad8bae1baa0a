use crate::{Clusters, FrontendConfig, Tracker};
use rp_frontend_changefeed::{ChangefeedCache, EnabledVersions, SharedVersions};
use rp_frontend_core::{
    OpenShiftCluster, OpenShiftClusterDocument, OpenShiftVersion, OpenShiftVersionDocument,
    OpenShiftVersionProperties, ProvisioningState, ResourceId, Subscription, SubscriptionDocument,
    SubscriptionState,
};
use rp_frontend_database::{Database, MemoryDatabase};
use std::sync::Arc;

pub const SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
pub const DEFAULT_VERSION: &str = "4.14.16";

pub struct Harness {
    pub store: MemoryDatabase,
    pub db: Database,
    pub tracker: Tracker,
    pub clusters: Clusters,
    pub versions: SharedVersions,
    pub config: Arc<FrontendConfig>,
}

impl Harness {
    pub async fn new() -> Self {
        let config = Arc::new(FrontendConfig::new("EastUS", "Microsoft.RedHatOpenShift"));
        let store = MemoryDatabase::new();
        let db = store.database(config.retry);
        db.subscriptions
            .create(mk_subscription(SubscriptionState::Registered))
            .await
            .unwrap();

        let versions = EnabledVersions::shared();
        versions.write().apply(OpenShiftVersionDocument {
            id: DEFAULT_VERSION.to_string(),
            etag: None,
            open_shift_version: OpenShiftVersion {
                properties: OpenShiftVersionProperties {
                    version: DEFAULT_VERSION.to_string(),
                    enabled: true,
                    default: true,
                    ..Default::default()
                },
                ..Default::default()
            },
        });

        let tracker = Tracker::new(
            db.open_shift_clusters.clone(),
            db.async_operations.clone(),
            config.clone(),
        );
        let clusters = Clusters::new(db.clone(), tracker.clone(), versions.clone(), config.clone());
        Self {
            store,
            db,
            tracker,
            clusters,
            versions,
            config,
        }
    }

    pub async fn set_subscription_state(&self, state: SubscriptionState) {
        self.db
            .subscriptions
            .patch(SUBSCRIPTION, |doc: &mut SubscriptionDocument| {
                doc.subscription.state = state;
                Ok::<_, rp_frontend_database::Error>(())
            })
            .await
            .unwrap();
    }

    /// Stores a cluster in `state`, as if created by an earlier request.
    pub async fn seed_cluster(&self, name: &str, state: ProvisioningState) -> OpenShiftClusterDocument {
        let resource = mk_resource(name);
        let mut doc = OpenShiftClusterDocument {
            id: format!("doc-{name}"),
            key: resource.key(),
            open_shift_cluster: OpenShiftCluster {
                id: resource.to_string(),
                name: name.to_string(),
                type_: resource.qualified_type(),
                location: "eastus".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let properties = &mut doc.open_shift_cluster.properties;
        properties.provisioning_state = state;
        properties.cluster_profile.version = DEFAULT_VERSION.to_string();
        properties.cluster_profile.domain = "example".to_string();
        properties.cluster_profile.pull_secret = "secret".to_string();
        self.db.open_shift_clusters.create(doc).await.unwrap()
    }

    pub async fn cluster(&self, name: &str) -> OpenShiftClusterDocument {
        self.db
            .open_shift_clusters
            .get(&mk_resource(name).key())
            .await
            .unwrap()
    }
}

pub fn mk_resource(name: &str) -> ResourceId {
    ResourceId::parse(&format!(
        "/subscriptions/{SUBSCRIPTION}/resourceGroups/resourceGroup/providers/Microsoft.RedHatOpenShift/openShiftClusters/{name}"
    ))
    .unwrap()
}

pub fn mk_subscription(state: SubscriptionState) -> SubscriptionDocument {
    SubscriptionDocument {
        id: SUBSCRIPTION.to_string(),
        etag: None,
        subscription: Subscription {
            state,
            properties: None,
        },
    }
}
