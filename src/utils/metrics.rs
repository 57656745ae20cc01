use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Relay-wide counters.
///
/// Cheap to clone and safe to share between the coalescer timers, the
/// worker and the generation providers.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    items_received: AtomicUsize,
    groups_flushed: AtomicUsize,

    posts_published: AtomicUsize,
    posts_skipped: AtomicUsize,
    posts_failed: AtomicUsize,
    rate_limit_waits: AtomicUsize,

    images_processed: AtomicUsize,
    images_modified: AtomicUsize,

    generation_success: AtomicUsize,
    generation_failed: AtomicUsize,
    local_fallbacks: AtomicUsize,
    provider_successes: DashMap<String, AtomicUsize>,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                items_received: AtomicUsize::new(0),
                groups_flushed: AtomicUsize::new(0),
                posts_published: AtomicUsize::new(0),
                posts_skipped: AtomicUsize::new(0),
                posts_failed: AtomicUsize::new(0),
                rate_limit_waits: AtomicUsize::new(0),
                images_processed: AtomicUsize::new(0),
                images_modified: AtomicUsize::new(0),
                generation_success: AtomicUsize::new(0),
                generation_failed: AtomicUsize::new(0),
                local_fallbacks: AtomicUsize::new(0),
                provider_successes: DashMap::new(),
                start_time: Instant::now(),
            }),
        }
    }

    // Intake
    pub fn record_item_received(&self) {
        self.inner.items_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group_flushed(&self) {
        self.inner.groups_flushed.fetch_add(1, Ordering::Relaxed);
    }

    // Publishing
    pub fn record_published(&self) {
        self.inner.posts_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.inner.posts_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.inner.posts_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_wait(&self) {
        self.inner.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
    }

    // Images
    pub fn record_image(&self, modified: bool) {
        self.inner.images_processed.fetch_add(1, Ordering::Relaxed);
        if modified {
            self.inner.images_modified.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Generation
    pub fn record_generation(&self, provider: Option<&str>) {
        match provider {
            Some(name) => {
                self.inner.generation_success.fetch_add(1, Ordering::Relaxed);
                self.inner
                    .provider_successes
                    .entry(name.to_string())
                    .or_insert_with(|| AtomicUsize::new(0))
                    .fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.inner.generation_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_local_fallback(&self) {
        self.inner.local_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        let provider_successes = self
            .inner
            .provider_successes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect();

        MetricsSnapshot {
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
            items_received: load(&self.inner.items_received),
            groups_flushed: load(&self.inner.groups_flushed),
            posts_published: load(&self.inner.posts_published),
            posts_skipped: load(&self.inner.posts_skipped),
            posts_failed: load(&self.inner.posts_failed),
            rate_limit_waits: load(&self.inner.rate_limit_waits),
            images_processed: load(&self.inner.images_processed),
            images_modified: load(&self.inner.images_modified),
            generation_success: load(&self.inner.generation_success),
            generation_failed: load(&self.inner.generation_failed),
            local_fallbacks: load(&self.inner.local_fallbacks),
            provider_successes,
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub items_received: usize,
    pub groups_flushed: usize,
    pub posts_published: usize,
    pub posts_skipped: usize,
    pub posts_failed: usize,
    pub rate_limit_waits: usize,
    pub images_processed: usize,
    pub images_modified: usize,
    pub generation_success: usize,
    pub generation_failed: usize,
    pub local_fallbacks: usize,
    pub provider_successes: BTreeMap<String, usize>,
}
