use chrono::{DateTime, Utc};
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// Observes change feed synchronization for every cache.
#[derive(Clone, Debug, Default)]
pub struct CacheMetrics {
    cache_size: Family<CacheLabels, Gauge>,
    batches: Family<CacheLabels, Counter>,
    errors: Family<CacheLabels, Counter>,
    last_sync_seconds: Family<CacheLabels, Gauge>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct CacheLabels {
    cache: String,
}

impl CacheMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let cache_size = Family::default();
        prom.register(
            "cache_size",
            "Gauge of the number of documents held by the cache",
            cache_size.clone(),
        );

        let batches = Family::default();
        prom.register(
            "batches",
            "Count of change feed batches applied to the cache",
            batches.clone(),
        );

        let errors = Family::default();
        prom.register(
            "errors",
            "Count of change feed passes aborted by an error",
            errors.clone(),
        );

        let last_sync_seconds = Family::default();
        prom.register(
            "last_sync_seconds",
            "Unix time of the last fully drained change feed pass",
            last_sync_seconds.clone(),
        );

        Self {
            cache_size,
            batches,
            errors,
            last_sync_seconds,
        }
    }

    pub(crate) fn batch_applied(&self, cache: &str, size: usize) {
        let labels = CacheLabels::new(cache);
        self.batches.get_or_create(&labels).inc();
        self.cache_size.get_or_create(&labels).set(size as i64);
    }

    pub(crate) fn pass_failed(&self, cache: &str) {
        self.errors.get_or_create(&CacheLabels::new(cache)).inc();
    }

    pub(crate) fn synced(&self, cache: &str, at: DateTime<Utc>) {
        self.last_sync_seconds
            .get_or_create(&CacheLabels::new(cache))
            .set(at.timestamp());
    }

    #[cfg(test)]
    pub(crate) fn errors(&self, cache: &str) -> u64 {
        self.errors.get_or_create(&CacheLabels::new(cache)).get()
    }

    #[cfg(test)]
    pub(crate) fn cache_size(&self, cache: &str) -> i64 {
        self.cache_size.get_or_create(&CacheLabels::new(cache)).get()
    }
}

impl CacheLabels {
    fn new(cache: &str) -> Self {
        Self {
            cache: cache.to_string(),
        }
    }
}
