use crate::Result;
use rp_frontend_core::{
    AsyncOperationDocument, OpenShiftClusterDocument, OpenShiftVersionDocument,
    PlatformWorkloadIdentityRoleSetDocument, SubscriptionDocument,
};

/// A JSON document held by the store.
pub trait Document: Clone + Send + Sync + 'static {
    /// Whether lookup keys must be lower case.
    const LOWERCASE_KEYS: bool = false;

    /// The unique lookup key of the document.
    fn key(&self) -> &str;

    /// The partition the document is stored in.
    fn partition_key(&self) -> &str {
        ""
    }

    fn etag(&self) -> Option<&str>;

    fn set_etag(&mut self, etag: Option<String>);
}

/// A page of documents returned by an iterator.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<D> {
    pub documents: Vec<D>,
}

/// A client for a single collection of the document store.
#[async_trait::async_trait]
pub trait DocumentClient<D>: Send + Sync {
    async fn get(&self, key: &str) -> Result<D>;

    /// Creates a document, failing with [`Error::Conflict`](crate::Error::Conflict) if the key
    /// is taken.
    async fn create(&self, doc: D) -> Result<D>;

    /// Replaces a document. When the document carries an etag the write only succeeds if it
    /// matches the stored version.
    async fn replace(&self, doc: D) -> Result<D>;

    async fn delete(&self, doc: &D) -> Result<()>;

    fn list(&self, continuation: Option<String>) -> Box<dyn DocumentIterator<D>>;

    fn list_by_prefix(
        &self,
        partition: &str,
        prefix: &str,
        continuation: Option<String>,
    ) -> Box<dyn DocumentIterator<D>>;

    /// Returns an iterator over changed documents in commit order. Each changed document is
    /// yielded once, in its latest version, including soft-deleted ones.
    fn change_feed(&self) -> Box<dyn DocumentIterator<D>>;
}

#[async_trait::async_trait]
pub trait DocumentIterator<D>: Send {
    /// Returns the next page, or `None` once the iterator is exhausted.
    async fn next(&mut self, max_items: Option<usize>) -> Result<Option<Page<D>>>;

    /// A token from which listing may be resumed.
    fn continuation(&self) -> Option<String>;
}

// === impl Page ===

impl<D> Page<D> {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl<D> IntoIterator for Page<D> {
    type Item = D;
    type IntoIter = std::vec::IntoIter<D>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

// === Documents ===

impl Document for OpenShiftClusterDocument {
    const LOWERCASE_KEYS: bool = true;

    fn key(&self) -> &str {
        &self.key
    }

    /// Clusters are partitioned by subscription.
    fn partition_key(&self) -> &str {
        self.key.split('/').nth(2).unwrap_or_default()
    }

    fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    fn set_etag(&mut self, etag: Option<String>) {
        self.etag = etag;
    }
}

macro_rules! id_keyed_document {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Document for $ty {
                fn key(&self) -> &str {
                    &self.id
                }

                fn etag(&self) -> Option<&str> {
                    self.etag.as_deref()
                }

                fn set_etag(&mut self, etag: Option<String>) {
                    self.etag = etag;
                }
            }
        )+
    };
}

id_keyed_document!(
    AsyncOperationDocument,
    SubscriptionDocument,
    OpenShiftVersionDocument,
    PlatformWorkloadIdentityRoleSetDocument,
);
