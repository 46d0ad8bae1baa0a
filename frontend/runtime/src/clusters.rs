use crate::{operations::Tracker, FrontendConfig};
use chrono::Utc;
use http::StatusCode;
use rp_frontend_changefeed::SharedVersions;
use rp_frontend_core::{
    code, Error, OpenShiftCluster, OpenShiftClusterDocument, ProvisioningState, ResourceId,
    SubscriptionDocument, SubscriptionState, FEATURE_ARBITRARY_VERSIONS,
};
use rp_frontend_database::{Database, Error as StoreError};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Applies mutating requests to cluster documents and records an operation for each.
#[derive(Clone)]
pub struct Clusters {
    db: Database,
    tracker: Tracker,
    versions: SharedVersions,
    config: Arc<FrontendConfig>,
}

/// A mutation that was committed and is now being worked on.
#[derive(Clone, Debug, PartialEq)]
pub struct Accepted {
    pub operation_id: String,

    /// `201 Created` for new clusters, `200 OK` for updates and `202 Accepted` for deletes.
    pub status: StatusCode,

    /// The cluster as committed, absent for deletes.
    pub cluster: Option<OpenShiftCluster>,
}

/// What a single put-or-patch attempt committed.
struct Committed {
    doc: OpenShiftClusterDocument,
    initial: ProvisioningState,
    created: bool,
}

// === impl Clusters ===

impl Clusters {
    pub fn new(
        db: Database,
        tracker: Tracker,
        versions: SharedVersions,
        config: Arc<FrontendConfig>,
    ) -> Self {
        Self {
            db,
            tracker,
            versions,
            config,
        }
    }

    pub async fn get(&self, resource: &ResourceId) -> Result<OpenShiftCluster, Error> {
        let doc = self.db.open_shift_clusters.get(&resource.key()).await?;
        Ok(doc.open_shift_cluster.to_external())
    }

    /// Creates or updates a cluster.
    ///
    /// A `PATCH` of a missing cluster fails with `NotFound`; a `PUT` creates it. The whole
    /// read-validate-write sequence is retried when a concurrent writer wins.
    #[instrument(skip(self, request), fields(key = %resource.key()))]
    pub async fn put_or_patch(
        &self,
        resource: &ResourceId,
        request: &OpenShiftCluster,
        is_patch: bool,
    ) -> Result<Accepted, Error> {
        let subscription = self
            .subscription(&resource.subscription_id, &[SubscriptionState::Registered])
            .await?;

        let operation_id = Tracker::new_operation_id();
        let committed = self
            .config
            .retry
            .retry_on_precondition_failed(|| {
                self.try_put_or_patch(resource, request, is_patch, &subscription, &operation_id)
            })
            .await?;

        self.tracker
            .create(&operation_id, resource, committed.initial, &committed.doc)
            .await?;
        debug!(%operation_id, created = committed.created, "Accepted");

        Ok(Accepted {
            operation_id,
            status: if committed.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            },
            cluster: Some(committed.doc.open_shift_cluster.to_external()),
        })
    }

    /// Marks a cluster for deletion.
    ///
    /// Deleting a cluster that does not exist is a no-op whatever the subscription's state:
    /// `None` is returned and no operation is recorded.
    #[instrument(skip(self), fields(key = %resource.key()))]
    pub async fn delete(&self, resource: &ResourceId) -> Result<Option<Accepted>, Error> {
        match self.db.open_shift_clusters.get(&resource.key()).await {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                debug!("Cluster does not exist");
                return Ok(None);
            }
            Err(error) => return Err(error.into()),
        }

        self.subscription(
            &resource.subscription_id,
            &[
                SubscriptionState::Registered,
                SubscriptionState::Warned,
                SubscriptionState::Suspended,
            ],
        )
        .await?;

        let operation_id = Tracker::new_operation_id();
        let mut initial = ProvisioningState::Succeeded;
        let res = self
            .db
            .open_shift_clusters
            .patch(&resource.key(), |doc: &mut OpenShiftClusterDocument| {
                let properties = &mut doc.open_shift_cluster.properties;
                check_terminal(properties.provisioning_state)?;
                initial = properties.provisioning_state;
                properties.provisioning_state = ProvisioningState::Deleting;
                doc.dequeues = 0;
                doc.async_operation_id = Some(operation_id.clone());
                Ok::<_, Error>(())
            })
            .await;
        let doc = match res {
            Ok(doc) => doc,
            Err(Error::NotFound) => {
                debug!("Cluster does not exist");
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        self.tracker
            .create(&operation_id, resource, initial, &doc)
            .await?;
        debug!(%operation_id, "Accepted");

        Ok(Some(Accepted {
            operation_id,
            status: StatusCode::ACCEPTED,
            cluster: None,
        }))
    }

    async fn try_put_or_patch(
        &self,
        resource: &ResourceId,
        request: &OpenShiftCluster,
        is_patch: bool,
        subscription: &SubscriptionDocument,
        operation_id: &str,
    ) -> Result<Committed, Error> {
        let key = resource.key();
        let current = match self.db.open_shift_clusters.get(&key).await {
            Ok(doc) => Some(doc),
            Err(StoreError::NotFound) if !is_patch => None,
            Err(error) => return Err(error.into()),
        };

        let Some(mut doc) = current else {
            let doc = self.new_cluster(resource, request, subscription, operation_id)?;
            let doc = match self.db.open_shift_clusters.create(doc).await {
                Ok(doc) => doc,
                // A concurrent create won; retry as an update.
                Err(StoreError::Conflict) => return Err(Error::PreconditionFailed),
                Err(error) => return Err(error.into()),
            };
            return Ok(Committed {
                doc,
                initial: ProvisioningState::Creating,
                created: true,
            });
        };

        let properties = &mut doc.open_shift_cluster.properties;
        let initial = properties.provisioning_state;
        check_terminal(initial)?;
        if initial == ProvisioningState::Failed {
            match properties.failed_provisioning_state {
                Some(ProvisioningState::Creating) => {
                    return Err(Error::bad_request(
                        code::REQUEST_NOT_ALLOWED,
                        "",
                        "Request is not allowed on cluster whose creation failed. Delete the cluster.",
                    ))
                }
                Some(ProvisioningState::Deleting) => {
                    return Err(Error::bad_request(
                        code::REQUEST_NOT_ALLOWED,
                        "",
                        "Request is not allowed on cluster whose deletion failed. Delete the cluster.",
                    ))
                }
                _ => {}
            }
        }

        let requested = &request.properties.cluster_profile;
        let profile = &mut properties.cluster_profile;
        for (target, current, requested) in [
            ("properties.clusterProfile.version", &profile.version, &requested.version),
            ("properties.clusterProfile.domain", &profile.domain, &requested.domain),
        ] {
            if !requested.is_empty() && requested != current {
                return Err(Error::bad_request(
                    code::PROPERTY_CHANGE_NOT_ALLOWED,
                    target,
                    format!("Changing property '{target}' is not allowed."),
                ));
            }
        }
        if !requested.pull_secret.is_empty() {
            profile.pull_secret = requested.pull_secret.clone();
        }

        properties.last_provisioning_state = Some(initial);
        properties.provisioning_state = ProvisioningState::Updating;
        doc.dequeues = 0;
        doc.async_operation_id = Some(operation_id.to_string());

        let doc = self.db.open_shift_clusters.update(doc).await?;
        Ok(Committed {
            doc,
            initial,
            created: false,
        })
    }

    fn new_cluster(
        &self,
        resource: &ResourceId,
        request: &OpenShiftCluster,
        subscription: &SubscriptionDocument,
        operation_id: &str,
    ) -> Result<OpenShiftClusterDocument, Error> {
        let allow_arbitrary = self.config.local_development
            || subscription
                .subscription
                .has_registered_feature(FEATURE_ARBITRARY_VERSIONS);
        let version = self
            .versions
            .read()
            .resolve_install_version(&request.properties.cluster_profile.version, allow_arbitrary)?;

        let mut oc = request.clone();
        oc.id = resource.to_string();
        oc.name = resource.name.clone();
        oc.type_ = resource.qualified_type();
        oc.location = self.config.location.clone();

        let properties = &mut oc.properties;
        properties.provisioning_state = ProvisioningState::Creating;
        properties.last_provisioning_state = None;
        properties.failed_provisioning_state = None;
        properties.created_at = Some(Utc::now());
        properties.cluster_profile.version = version;
        properties.cluster_profile.resource_group_id =
            properties.cluster_profile.resource_group_id.to_lowercase();

        Ok(OpenShiftClusterDocument {
            id: uuid::Uuid::new_v4().to_string(),
            key: resource.key(),
            etag: None,
            dequeues: 0,
            lease_owner: None,
            async_operation_id: Some(operation_id.to_string()),
            open_shift_cluster: oc,
        })
    }

    /// Fetches the subscription, requiring it to be in one of `allowed` states.
    async fn subscription(
        &self,
        subscription_id: &str,
        allowed: &[SubscriptionState],
    ) -> Result<SubscriptionDocument, Error> {
        let doc = match self.db.subscriptions.get(subscription_id).await {
            Ok(doc) => doc,
            Err(StoreError::NotFound) => {
                return Err(Error::bad_request(
                    code::INVALID_SUBSCRIPTION_STATE,
                    "",
                    format!(
                        "Request is not allowed in unregistered subscription '{subscription_id}'."
                    ),
                ))
            }
            Err(error) => return Err(error.into()),
        };

        if !allowed.contains(&doc.subscription.state) {
            return Err(Error::bad_request(
                code::INVALID_SUBSCRIPTION_STATE,
                "",
                format!(
                    "Request is not allowed in subscription in state '{}'.",
                    doc.subscription.state
                ),
            ));
        }
        Ok(doc)
    }
}

/// Mutations are only accepted once the previous operation has finished.
fn check_terminal(state: ProvisioningState) -> Result<(), Error> {
    if !state.is_terminal() {
        return Err(Error::bad_request(
            code::REQUEST_NOT_ALLOWED,
            "",
            format!("Request is not allowed in provisioningState '{state}'."),
        ));
    }
    Ok(())
}
