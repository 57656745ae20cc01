// Ordered provider fallback with promotion of whoever answered last

use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::{GenerationProvider, GenerationRequest};
use crate::core::errors::GenerationError;
use crate::utils::Metrics;

/// Tries providers in order and moves the one that succeeded to the front
///
/// An empty list disables generation: every call returns `None` without
/// touching the network.
pub struct FallbackTextGenerator {
    providers: Mutex<Vec<Arc<dyn GenerationProvider>>>,
    metrics: Option<Metrics>,
}

impl FallbackTextGenerator {
    pub fn new(providers: Vec<Arc<dyn GenerationProvider>>) -> Self {
        Self {
            providers: Mutex::new(providers),
            metrics: None,
        }
    }

    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    /// Probe every candidate concurrently and keep the ones that answer
    ///
    /// Survivors keep their relative order. Providers that fail here stay
    /// out for the lifetime of the generator.
    pub async fn probed(candidates: Vec<Arc<dyn GenerationProvider>>) -> Self {
        let results = join_all(candidates.iter().map(|p| p.probe())).await;

        let mut alive = Vec::with_capacity(candidates.len());
        for (provider, ok) in candidates.into_iter().zip(results) {
            if ok {
                info!("Provider '{}' is available", provider.name());
                alive.push(provider);
            } else {
                warn!("Provider '{}' failed its probe and is disabled", provider.name());
            }
        }

        if alive.is_empty() {
            warn!("No generation provider passed the probe, local rewrites only");
        }
        Self::new(alive)
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.providers.lock().is_empty()
    }

    /// Provider names in their current order
    pub fn order(&self) -> Vec<String> {
        self.providers.lock().iter().map(|p| p.name().to_string()).collect()
    }

    #[instrument(skip_all)]
    pub async fn generate(&self, request: &GenerationRequest) -> Option<String> {
        // Work on a snapshot so the lock is never held across a call
        let snapshot: Vec<Arc<dyn GenerationProvider>> = self.providers.lock().clone();
        if snapshot.is_empty() {
            debug!("Generation disabled");
            return None;
        }

        for provider in &snapshot {
            if let Some(text) = provider.generate(request).await {
                self.promote(provider);
                if let Some(metrics) = &self.metrics {
                    metrics.record_generation(Some(provider.name()));
                }
                return Some(text);
            }
            debug!("Provider '{}' gave nothing, trying next", provider.name());
        }

        warn!("{} ({} tried)", GenerationError::NoProviderAvailable, snapshot.len());
        if let Some(metrics) = &self.metrics {
            metrics.record_generation(None);
        }
        None
    }

    fn promote(&self, winner: &Arc<dyn GenerationProvider>) {
        let mut providers = self.providers.lock();
        let position = providers
            .iter()
            .position(|p| Arc::as_ptr(p) as *const () == Arc::as_ptr(winner) as *const ());
        if let Some(index) = position.filter(|&i| i > 0) {
            providers.swap(0, index);
            info!("Provider '{}' promoted to primary", winner.name());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _request: &GenerationRequest) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.map(str::to_string)
        }
    }

    fn dyn_list(items: &[&Arc<Scripted>]) -> Vec<Arc<dyn GenerationProvider>> {
        items
            .iter()
            .map(|p| Arc::clone(p) as Arc<dyn GenerationProvider>)
            .collect()
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new("prompt")
    }

    #[tokio::test]
    async fn test_failed_primary_is_demoted() {
        let a = Scripted::new("a", None);
        let b = Scripted::new("b", Some("from b"));
        let generator = FallbackTextGenerator::new(dyn_list(&[&a, &b]));

        assert_eq!(generator.generate(&request()).await.as_deref(), Some("from b"));
        assert_eq!(generator.order(), vec!["b", "a"]);

        // Next call goes to b first and never reaches a
        generator.generate(&request()).await;
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_swap_with_front() {
        let generator = FallbackTextGenerator::new(dyn_list(&[
            &Scripted::new("a", None),
            &Scripted::new("b", None),
            &Scripted::new("c", Some("c")),
        ]));
        generator.generate(&request()).await;
        assert_eq!(generator.order(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_all_fail() {
        let metrics = Metrics::new();
        let generator = FallbackTextGenerator::new(dyn_list(&[&Scripted::new("a", None), &Scripted::new("b", None)]))
            .with_metrics(metrics.clone());
        assert!(generator.generate(&request()).await.is_none());
        assert_eq!(generator.order(), vec!["a", "b"]);
        assert_eq!(metrics.snapshot().generation_failed, 1);
    }

    #[tokio::test]
    async fn test_disabled_never_calls() {
        let generator = FallbackTextGenerator::disabled();
        assert!(!generator.is_enabled());
        assert!(generator.generate(&request()).await.is_none());
    }

    #[tokio::test]
    async fn test_probe_filters_and_keeps_order() {
        let generator = FallbackTextGenerator::probed(dyn_list(&[
            &Scripted::new("x", Some("ok")),
            &Scripted::new("dead", None),
            &Scripted::new("y", Some("ok")),
        ]))
        .await;
        assert_eq!(generator.order(), vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_success_is_counted_per_provider() {
        let metrics = Metrics::new();
        let generator =
            FallbackTextGenerator::new(dyn_list(&[&Scripted::new("a", Some("t"))])).with_metrics(metrics.clone());
        generator.generate(&request()).await;
        assert_eq!(metrics.snapshot().provider_successes["a"], 1);
    }
}
