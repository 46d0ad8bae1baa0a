use crate::FrontendConfig;
use chrono::Utc;
use rp_frontend_core::{
    operation_path, AsyncOperation, AsyncOperationDocument, CloudError, Error, OpenShiftCluster,
    OpenShiftClusterDocument, OperationStatus, ProvisioningState, ResourceId,
};
use rp_frontend_database::{AsyncOperations, OpenShiftClusters};
use std::sync::Arc;
use tracing::{error, info, instrument};

pub const OPERATIONS_STATUS: &str = "operationsstatus";
pub const OPERATION_RESULTS: &str = "operationresults";

/// Creates, completes and serves the records of long-running cluster operations.
#[derive(Clone)]
pub struct Tracker {
    clusters: OpenShiftClusters,
    operations: AsyncOperations,
    config: Arc<FrontendConfig>,
}

/// The outcome of an operation as reported by the `operationresults` endpoint.
#[derive(Clone, Debug, PartialEq)]
pub enum OperationResult {
    /// The cluster is still being acted on. Carries the path to poll.
    InProgress { location: String },

    /// The operation finished and the cluster as it stood at completion.
    Succeeded(OpenShiftCluster),

    /// The operation finished and nothing remains to report, e.g. after a delete.
    NoContent,

    Failed(CloudError),
}

// === impl Tracker ===

impl Tracker {
    pub fn new(
        clusters: OpenShiftClusters,
        operations: AsyncOperations,
        config: Arc<FrontendConfig>,
    ) -> Self {
        Self {
            clusters,
            operations,
            config,
        }
    }

    /// Generates the identifier of a new operation.
    ///
    /// Identifiers are reserved before the cluster mutation so that every retry of the
    /// mutation records the same back-reference.
    pub fn new_operation_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Records an operation against a cluster whose mutation has already been committed.
    ///
    /// `initial` is the cluster's provisioning state before the mutation; the record's current
    /// state is taken from the committed document.
    #[instrument(skip_all, fields(%operation_id))]
    pub async fn create(
        &self,
        operation_id: &str,
        resource: &ResourceId,
        initial: ProvisioningState,
        doc: &OpenShiftClusterDocument,
    ) -> Result<String, Error> {
        let op = AsyncOperationDocument {
            id: operation_id.to_string(),
            open_shift_cluster_key: doc.key.clone(),
            etag: None,
            async_operation: AsyncOperation {
                id: self.operation_path(&resource.subscription_id, OPERATIONS_STATUS, operation_id),
                name: operation_id.to_string(),
                initial_provisioning_state: initial,
                provisioning_state: doc.provisioning_state(),
                start_time: Utc::now(),
                end_time: None,
                error: None,
                error_status: None,
            },
            open_shift_cluster: None,
        };
        self.operations.create(op).await?;
        Ok(operation_id.to_string())
    }

    /// Returns the status of an operation.
    ///
    /// While the cluster still references the operation, the cluster's live provisioning state
    /// is reported. Otherwise the stored record is authoritative.
    pub async fn status(
        &self,
        subscription_id: &str,
        operation_id: &str,
    ) -> Result<OperationStatus, Error> {
        let (op, cluster) = self.load(subscription_id, operation_id).await?;
        Ok(resolve_status(&op, cluster.as_ref()))
    }

    /// Returns the outcome of an operation.
    ///
    /// An operation is in progress until its record is terminal, unless the cluster it acted on
    /// is gone. A completed operation without a snapshot has no content to report.
    pub async fn result(
        &self,
        subscription_id: &str,
        operation_id: &str,
    ) -> Result<OperationResult, Error> {
        let (op, cluster) = self.load(subscription_id, operation_id).await?;

        let in_flight = cluster.is_some_and(|c| {
            c.is_operation_in_flight(&op.id) || !op.async_operation.is_terminal()
        });
        if in_flight {
            return Ok(OperationResult::InProgress {
                location: self.operation_path(subscription_id, OPERATION_RESULTS, operation_id),
            });
        }

        if op.async_operation.provisioning_state == ProvisioningState::Failed {
            let error = op
                .async_operation
                .cloud_error()
                .unwrap_or_else(CloudError::internal);
            return Ok(OperationResult::Failed(error));
        }

        Ok(match op.open_shift_cluster {
            Some(oc) => OperationResult::Succeeded(oc.to_external()),
            None => OperationResult::NoContent,
        })
    }

    /// Moves an operation to its terminal state and stores the cluster as it stands.
    ///
    /// Cloud errors are recorded as-is; any other failure is recorded as a generic internal
    /// error. Completing an operation that is already terminal changes nothing.
    #[instrument(skip(self, failure, cluster))]
    pub async fn complete(
        &self,
        operation_id: &str,
        state: ProvisioningState,
        failure: Option<&Error>,
        cluster: Option<&OpenShiftCluster>,
    ) -> Result<AsyncOperationDocument, Error> {
        let current = self.operations.get(operation_id).await?;
        if current.async_operation.is_terminal() {
            return Ok(current);
        }

        let error = failure.map(|error| match error {
            Error::InvalidState(e) => e.clone(),
            _ => CloudError::internal(),
        });
        let doc = self
            .operations
            .patch(operation_id, |doc: &mut AsyncOperationDocument| {
                let running = doc.async_operation.provisioning_state;
                if doc
                    .async_operation
                    .transition(state, error.clone(), Utc::now())
                {
                    doc.open_shift_cluster = cluster.map(|oc| {
                        let mut oc = oc.clone();
                        oc.properties.provisioning_state = state;
                        oc.properties.last_provisioning_state = None;
                        oc.properties.failed_provisioning_state =
                            (state == ProvisioningState::Failed).then_some(running);
                        oc
                    });
                }
                Ok::<_, Error>(())
            })
            .await?;

        if state == ProvisioningState::Failed {
            error!(error = ?doc.async_operation.error, "long running operation failed");
        } else {
            info!(%state, "long running operation succeeded");
        }
        Ok(doc)
    }

    /// Finishes the operation acting on the cluster at `key`.
    ///
    /// The record is completed with the cluster as it stands before the lease is released, so a
    /// poller never observes a released cluster with an unfinished record. A cluster that no
    /// longer exists only has its record completed.
    #[instrument(skip(self, failure))]
    pub async fn end_operation(
        &self,
        key: &str,
        operation_id: &str,
        state: ProvisioningState,
        failure: Option<&Error>,
    ) -> Result<AsyncOperationDocument, Error> {
        let cluster = match self.clusters.get(key).await {
            Ok(doc) => Some(doc),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        let op = self
            .complete(
                operation_id,
                state,
                failure,
                cluster.as_ref().map(|doc| &doc.open_shift_cluster),
            )
            .await?;

        if cluster.is_some() {
            let failed = op
                .open_shift_cluster
                .as_ref()
                .and_then(|oc| oc.properties.failed_provisioning_state);
            self.clusters.end_lease(key, state, failed).await?;
        }
        Ok(op)
    }

    pub fn operation_path(&self, subscription_id: &str, kind: &str, operation_id: &str) -> String {
        operation_path(
            subscription_id,
            &self.config.resource_provider_namespace,
            &self.config.location,
            kind,
            operation_id,
        )
    }

    /// Loads an operation owned by `subscription_id` and the cluster it references, if that
    /// still exists.
    ///
    /// Operations of other subscriptions are reported as missing.
    async fn load(
        &self,
        subscription_id: &str,
        operation_id: &str,
    ) -> Result<(AsyncOperationDocument, Option<OpenShiftClusterDocument>), Error> {
        let op = self.operations.get(operation_id).await?;
        let owned = op
            .async_operation
            .subscription_id()
            .is_some_and(|s| s.eq_ignore_ascii_case(subscription_id));
        if !owned {
            return Err(Error::NotFound);
        }

        let cluster = match self.clusters.get(&op.open_shift_cluster_key).await {
            Ok(doc) => Some(doc),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        Ok((op, cluster))
    }
}

/// Chooses the authoritative status of an operation.
///
/// A cluster that still references the operation is being worked on, so its live provisioning
/// state wins and the operation has neither ended nor failed. Once the cluster has moved on or
/// been deleted, the stored record is reported as-is.
pub fn resolve_status(
    op: &AsyncOperationDocument,
    cluster: Option<&OpenShiftClusterDocument>,
) -> OperationStatus {
    let mut status = op.async_operation.to_status();
    if let Some(cluster) = cluster.filter(|c| c.is_operation_in_flight(&op.id)) {
        status.status = cluster.provisioning_state();
        status.end_time = None;
        status.error = None;
    }
    status
}
