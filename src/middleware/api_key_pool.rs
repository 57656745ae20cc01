// API key rotation with health tracking
//
// Each call borrows one key. Keys that keep failing are parked for a cool-down
// period and then offered again. The pool never retries on its own.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Consecutive failures before a key is parked
const UNHEALTHY_AFTER: u32 = 3;
/// A failure this recent marks the key as degraded
const DEGRADED_WINDOW: Duration = Duration::from_secs(60);
/// Parked keys are offered again after this long
const RECOVERY_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug)]
struct KeyState {
    key: String,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    uses: u64,
    failures: u64,
}

impl KeyState {
    fn new(key: String) -> Self {
        Self {
            key,
            consecutive_failures: 0,
            last_failure: None,
            uses: 0,
            failures: 0,
        }
    }

    fn health(&self) -> KeyHealth {
        if self.consecutive_failures >= UNHEALTHY_AFTER {
            return KeyHealth::Unhealthy;
        }
        match self.last_failure {
            Some(at) if self.consecutive_failures > 0 && at.elapsed() < DEGRADED_WINDOW => {
                KeyHealth::Degraded
            }
            _ => KeyHealth::Healthy,
        }
    }

    /// Selection tier: 0 healthy, 1 degraded, 2 parked but due for another try
    fn tier(&self) -> Option<u8> {
        match self.health() {
            KeyHealth::Healthy => Some(0),
            KeyHealth::Degraded => Some(1),
            KeyHealth::Unhealthy => self
                .last_failure
                .map_or(true, |at| at.elapsed() > RECOVERY_AFTER)
                .then_some(2),
        }
    }
}

/// Round-robin over the healthiest available keys
pub struct ApiKeyPool {
    keys: RwLock<Vec<KeyState>>,
    cursor: AtomicUsize,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            keys: RwLock::new(keys.into_iter().map(KeyState::new).collect()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Pick a key: healthy first, then degraded, then parked keys past their cool-down
    pub async fn next_key(&self) -> Option<(usize, String)> {
        let keys = self.keys.read().await;

        for tier in 0..3u8 {
            let candidates: Vec<usize> = keys
                .iter()
                .enumerate()
                .filter(|(_, k)| k.tier() == Some(tier))
                .map(|(i, _)| i)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            let turn = self.cursor.fetch_add(1, Ordering::Relaxed);
            let index = candidates[turn % candidates.len()];
            if tier > 0 {
                warn!("No healthy API keys, falling back to key {}", index);
            } else {
                debug!("Using API key {} ({} healthy)", index, candidates.len());
            }
            return Some((index, keys[index].key.clone()));
        }

        warn!("No API keys available");
        None
    }

    pub async fn record_success(&self, index: usize) {
        let mut keys = self.keys.write().await;
        if let Some(state) = keys.get_mut(index) {
            if state.consecutive_failures >= UNHEALTHY_AFTER {
                info!("API key {} recovered", index);
            }
            state.uses += 1;
            state.consecutive_failures = 0;
            state.last_failure = None;
        }
    }

    pub async fn record_failure(&self, index: usize) {
        let mut keys = self.keys.write().await;
        if let Some(state) = keys.get_mut(index) {
            state.uses += 1;
            state.failures += 1;
            state.consecutive_failures += 1;
            state.last_failure = Some(Instant::now());
            if state.consecutive_failures == UNHEALTHY_AFTER {
                warn!(
                    "API key {} parked after {} consecutive failures ({}/{} failed overall)",
                    index, state.consecutive_failures, state.failures, state.uses
                );
            }
        }
    }

    pub async fn health(&self, index: usize) -> Option<KeyHealth> {
        self.keys.read().await.get(index).map(KeyState::health)
    }

    pub async fn healthy_count(&self) -> usize {
        self.keys
            .read()
            .await
            .iter()
            .filter(|k| k.health() == KeyHealth::Healthy)
            .count()
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }
}
