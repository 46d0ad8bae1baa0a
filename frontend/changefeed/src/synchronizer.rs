use crate::CacheMetrics;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use rp_frontend_database::DocumentIterator;
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::{sync::watch, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A cache maintained from a change feed.
pub trait ChangefeedCache<D> {
    /// Applies a document observed on the change feed.
    ///
    /// Documents are applied in feed order and may be observed more than once, so application
    /// must be idempotent.
    fn apply(&mut self, doc: D);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type SharedCache<C> = Arc<RwLock<C>>;

/// Watches the time of a synchronizer's last fully drained pass.
pub type LastSync = watch::Receiver<Option<DateTime<Utc>>>;

/// Drains a change feed into a shared cache.
pub struct Synchronizer<D, C> {
    name: &'static str,
    feed: Box<dyn DocumentIterator<D>>,
    cache: SharedCache<C>,
    interval: time::Duration,
    metrics: CacheMetrics,
    last_sync: watch::Sender<Option<DateTime<Utc>>>,
}

/// Why a pass ended without draining the feed.
enum Interrupted {
    Cancelled,
    Failed(rp_frontend_database::Error),
}

// === impl Synchronizer ===

impl<D, C> Synchronizer<D, C>
where
    D: Send + 'static,
    C: ChangefeedCache<D> + Send + Sync + 'static,
{
    pub fn new(
        name: &'static str,
        feed: Box<dyn DocumentIterator<D>>,
        cache: SharedCache<C>,
        interval: time::Duration,
        metrics: CacheMetrics,
    ) -> (Self, LastSync) {
        let (last_sync, rx) = watch::channel(None);
        let sync = Self {
            name,
            feed,
            cache,
            interval,
            metrics,
            last_sync,
        };
        (sync, rx)
    }

    /// Drains the feed on every tick of the interval until `shutdown` is cancelled.
    ///
    /// The first pass starts immediately. A pass that fails is logged and retried on the next
    /// tick; the cache keeps whatever the failed pass had already applied. Panics are contained
    /// to the pass that raised them.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    debug!("Shutting down");
                    return;
                }
                _ = interval.tick() => {}
            }

            let name = self.name;
            match AssertUnwindSafe(self.drain(&shutdown)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(Interrupted::Cancelled)) => {
                    debug!("Shutting down mid-pass");
                    return;
                }
                Ok(Err(Interrupted::Failed(error))) => {
                    warn!(%error, "Failed to read change feed");
                    self.metrics.pass_failed(name);
                }
                Err(_) => {
                    error!("Change feed pass panicked");
                    self.metrics.pass_failed(name);
                }
            }
        }
    }

    /// Applies pages until the feed is exhausted. Each page is applied under a single write lock.
    async fn drain(&mut self, shutdown: &CancellationToken) -> Result<(), Interrupted> {
        loop {
            if shutdown.is_cancelled() {
                return Err(Interrupted::Cancelled);
            }

            let page = match self.feed.next(None).await {
                Ok(Some(page)) => page,
                Ok(None) => break,
                Err(error) => return Err(Interrupted::Failed(error)),
            };
            debug!(documents = page.len(), "Applying batch");

            let size = {
                let mut cache = self.cache.write();
                for doc in page {
                    cache.apply(doc);
                }
                cache.len()
            };
            self.metrics.batch_applied(self.name, size);
        }

        let now = Utc::now();
        let first = self.last_sync.send_replace(Some(now)).is_none();
        if first {
            info!("Initial population complete");
        }
        self.metrics.synced(self.name, now);
        Ok(())
    }
}
