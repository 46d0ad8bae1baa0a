use crate::{
    memory::MemoryClient, Document, DocumentClient, DocumentIterator, Error, Result, RetryPolicy,
    Retryable,
};
use parking_lot::Mutex;
use rp_frontend_core::{
    AsyncOperationDocument, OpenShiftClusterDocument, OpenShiftVersionDocument,
    PlatformWorkloadIdentityRoleSetDocument, ProvisioningState, SubscriptionDocument,
};
use std::sync::Arc;

/// A typed handle on one collection of the document store.
pub struct Collection<D> {
    client: Arc<dyn DocumentClient<D>>,
    retry: RetryPolicy,
}

pub type OpenShiftClusters = Collection<OpenShiftClusterDocument>;
pub type AsyncOperations = Collection<AsyncOperationDocument>;
pub type Subscriptions = Collection<SubscriptionDocument>;
pub type OpenShiftVersions = Collection<OpenShiftVersionDocument>;
pub type PlatformWorkloadIdentityRoleSets = Collection<PlatformWorkloadIdentityRoleSetDocument>;

/// Every collection the frontend uses.
#[derive(Clone)]
pub struct Database {
    pub open_shift_clusters: OpenShiftClusters,
    pub async_operations: AsyncOperations,
    pub subscriptions: Subscriptions,
    pub open_shift_versions: OpenShiftVersions,
    pub platform_workload_identity_role_sets: PlatformWorkloadIdentityRoleSets,
}

/// In-memory clients backing a [`Database`].
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    pub open_shift_clusters: MemoryClient<OpenShiftClusterDocument>,
    pub async_operations: MemoryClient<AsyncOperationDocument>,
    pub subscriptions: MemoryClient<SubscriptionDocument>,
    pub open_shift_versions: MemoryClient<OpenShiftVersionDocument>,
    pub platform_workload_identity_role_sets: MemoryClient<PlatformWorkloadIdentityRoleSetDocument>,
}

// === impl Collection ===

impl<D> Clone for Collection<D> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            retry: self.retry,
        }
    }
}

impl<D: Document> Collection<D> {
    pub fn new(client: Arc<dyn DocumentClient<D>>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub async fn get(&self, key: &str) -> Result<D> {
        check_key::<D>(key)?;
        self.client.get(key).await
    }

    pub async fn create(&self, doc: D) -> Result<D> {
        check_key::<D>(doc.key())?;
        self.client.create(doc).await
    }

    /// Replaces the document, conditional on its etag.
    pub async fn update(&self, doc: D) -> Result<D> {
        check_key::<D>(doc.key())?;
        self.client.replace(doc).await
    }

    pub async fn delete(&self, doc: &D) -> Result<()> {
        check_key::<D>(doc.key())?;
        self.client.delete(doc).await
    }

    /// Applies `mutate` to the latest version of the document and writes it back, retrying
    /// the whole read-modify-write when a concurrent writer wins.
    ///
    /// Errors returned by `mutate` abort the patch without writing.
    pub async fn patch<E, F>(&self, key: &str, mutate: F) -> Result<D, E>
    where
        E: Retryable + From<Error>,
        F: FnMut(&mut D) -> Result<(), E> + Send,
    {
        let mutate = Mutex::new(mutate);
        self.retry
            .retry_on_precondition_failed(|| {
                let mutate = &mutate;
                async move {
                    let mut doc = self.get(key).await?;
                    let res = {
                        let mut mutate = mutate.lock();
                        (*mutate)(&mut doc)
                    };
                    res?;
                    Ok(self.update(doc).await?)
                }
            })
            .await
    }

    pub fn list(&self, continuation: Option<String>) -> Box<dyn DocumentIterator<D>> {
        self.client.list(continuation)
    }

    pub fn list_by_prefix(
        &self,
        partition: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Result<Box<dyn DocumentIterator<D>>> {
        check_key::<D>(prefix)?;
        Ok(self.client.list_by_prefix(partition, prefix, continuation))
    }

    pub fn change_feed(&self) -> Box<dyn DocumentIterator<D>> {
        self.client.change_feed()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }
}

fn check_key<D: Document>(key: &str) -> Result<()> {
    if D::LOWERCASE_KEYS && key != key.to_lowercase() {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl OpenShiftClusters {
    /// Records the outcome of the operation acting on the cluster and releases its lease.
    ///
    /// Terminal states also detach the cluster from its operation, so later status reads fall
    /// back to the stored operation record. Failures keep the dequeue count.
    pub async fn end_lease(
        &self,
        key: &str,
        provisioning_state: ProvisioningState,
        failed_provisioning_state: Option<ProvisioningState>,
    ) -> Result<OpenShiftClusterDocument> {
        self.patch(key, |doc: &mut OpenShiftClusterDocument| {
            let properties = &mut doc.open_shift_cluster.properties;
            properties.provisioning_state = provisioning_state;
            properties.failed_provisioning_state = failed_provisioning_state;
            doc.lease_owner = None;
            if provisioning_state != ProvisioningState::Failed {
                doc.dequeues = 0;
            }
            if provisioning_state.is_terminal() {
                properties.last_provisioning_state = None;
                doc.async_operation_id = None;
            }
            Ok::<_, Error>(())
        })
        .await
    }
}

// === impl MemoryDatabase ===

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(&self, retry: RetryPolicy) -> Database {
        Database {
            open_shift_clusters: Collection::new(Arc::new(self.open_shift_clusters.clone()), retry),
            async_operations: Collection::new(Arc::new(self.async_operations.clone()), retry),
            subscriptions: Collection::new(Arc::new(self.subscriptions.clone()), retry),
            open_shift_versions: Collection::new(Arc::new(self.open_shift_versions.clone()), retry),
            platform_workload_identity_role_sets: Collection::new(
                Arc::new(self.platform_workload_identity_role_sets.clone()),
                retry,
            ),
        }
    }
}
