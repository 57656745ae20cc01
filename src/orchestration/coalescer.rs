// Group coalescer: collects items that share a group key and releases them
// as one list once the group has been quiet for the debounce delay

use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::types::IncomingItem;
use crate::utils::Metrics;

/// Receives every flushed group, in flush order
pub type GroupSink = mpsc::UnboundedSender<Vec<IncomingItem>>;

struct ActiveGroup {
    items: Vec<IncomingItem>,
    /// Only the timer carrying this epoch may flush the group
    epoch: u64,
    timer: JoinHandle<()>,
}

struct State {
    groups: HashMap<String, ActiveGroup>,
    /// `None` once shut down
    sink: Option<GroupSink>,
}

struct Shared {
    state: Mutex<State>,
    epochs: AtomicU64,
    delay: Duration,
    metrics: Metrics,
}

impl Shared {
    fn flush_if_current(&self, key: &str, epoch: u64) {
        let mut state = self.state.lock();

        if state.groups.get(key).map(|g| g.epoch) != Some(epoch) {
            debug!("Stale timer for group {} ignored", key);
            return;
        }
        let Some(group) = state.groups.remove(key) else {
            return;
        };

        let items = sorted(group.items);
        debug!("Group {} quiet, flushing {} items", key, items.len());
        match &state.sink {
            Some(sink) => self.emit(sink, items),
            None => warn!("Group {} flushed after shutdown, dropped", key),
        }
    }

    fn emit(&self, sink: &GroupSink, items: Vec<IncomingItem>) {
        let count = items.len();
        if sink.send(items).is_err() {
            warn!("Worker is gone, dropped a group of {} items", count);
            return;
        }
        self.metrics.record_group_flushed();
    }
}

fn sorted(mut items: Vec<IncomingItem>) -> Vec<IncomingItem> {
    items.sort_by_key(|item| item.id);
    items
}

/// Debounces grouped items; ungrouped items pass straight through
///
/// Must be used from inside a Tokio runtime (timers are spawned tasks).
#[derive(Clone)]
pub struct GroupCoalescer {
    shared: Arc<Shared>,
}

impl GroupCoalescer {
    pub fn new(delay: Duration, sink: GroupSink, metrics: Metrics) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    groups: HashMap::new(),
                    sink: Some(sink),
                }),
                epochs: AtomicU64::new(0),
                delay,
                metrics,
            }),
        }
    }

    pub fn on_new_item(&self, item: IncomingItem) {
        let mut state = self.shared.state.lock();

        let Some(sink) = state.sink.clone() else {
            warn!("Item {} arrived after shutdown, dropped", item.id);
            return;
        };
        self.shared.metrics.record_item_received();

        let Some(key) = item.group_key.clone() else {
            self.shared.emit(&sink, vec![item]);
            return;
        };

        let epoch = self.shared.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        let timer = self.spawn_timer(key.clone(), epoch);

        match state.groups.entry(key) {
            Entry::Occupied(mut entry) => {
                let group = entry.get_mut();
                group.timer.abort();
                group.items.push(item);
                group.epoch = epoch;
                group.timer = timer;
                debug!("Group {} now has {} items, timer restarted", entry.key(), entry.get().items.len());
            }
            Entry::Vacant(entry) => {
                debug!("Group {} opened", entry.key());
                entry.insert(ActiveGroup {
                    items: vec![item],
                    epoch,
                    timer,
                });
            }
        }
    }

    fn spawn_timer(&self, key: String, epoch: u64) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let deadline = Instant::now() + shared.delay;
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            shared.flush_if_current(&key, epoch);
        })
    }

    /// Groups still waiting for their timer
    pub fn pending_groups(&self) -> usize {
        self.shared.state.lock().groups.len()
    }

    /// Stop all timers, hand every buffered group to the sink right away and
    /// close it. Later items are dropped.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        let Some(sink) = state.sink.take() else {
            return;
        };

        let mut pending: Vec<(String, ActiveGroup)> = state.groups.drain().collect();
        pending.sort_by_key(|(_, group)| group.items.iter().map(|i| i.id).min());

        for (key, group) in pending {
            group.timer.abort();
            info!("Shutdown: flushing buffered group {} ({} items)", key, group.items.len());
            self.shared.emit(&sink, sorted(group.items));
        }
        // Dropping the last sender closes the channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    fn grouped(id: i64, key: &str) -> IncomingItem {
        IncomingItem::text(id, format!("item {}", id)).with_group(key)
    }

    fn ids(group: &[IncomingItem]) -> Vec<i64> {
        group.iter().map(|i| i.id).collect()
    }

    fn coalescer() -> (GroupCoalescer, mpsc::UnboundedReceiver<Vec<IncomingItem>>, Metrics) {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Metrics::new();
        (GroupCoalescer::new(Duration::from_secs(2), tx, metrics.clone()), rx, metrics)
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_flushes_sorted_after_quiet_period() {
        let (c, mut rx, _) = coalescer();

        c.on_new_item(grouped(5, "K"));
        tokio::time::advance(Duration::from_millis(1500)).await;
        c.on_new_item(grouped(3, "K"));
        let last_arrival = Instant::now();

        let group = rx.recv().await.unwrap();
        assert_eq!(ids(&group), vec![3, 5]);
        let waited = last_arrival.elapsed();
        assert!(waited >= Duration::from_secs(2) && waited < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_never_flushes_twice() {
        let (c, mut rx, metrics) = coalescer();

        for id in [1, 2, 3, 4] {
            c.on_new_item(grouped(id, "K"));
            tokio::time::advance(Duration::from_millis(500)).await;
        }

        let group = rx.recv().await.unwrap();
        assert_eq!(ids(&group), vec![1, 2, 3, 4]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(c.pending_groups(), 0);
        assert_eq!(metrics.snapshot().groups_flushed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ungrouped_items_pass_through() {
        let (c, mut rx, _) = coalescer();
        c.on_new_item(IncomingItem::text(7, "alone"));
        let group = rx.try_recv().unwrap();
        assert_eq!(ids(&group), vec![7]);
        assert_eq!(c.pending_groups(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let (c, mut rx, _) = coalescer();
        c.on_new_item(grouped(10, "A"));
        tokio::time::advance(Duration::from_secs(1)).await;
        c.on_new_item(grouped(20, "B"));
        c.on_new_item(grouped(11, "A"));

        // A restarted at t=1, B started at t=1: both due at t=3
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let mut all = vec![ids(&first), ids(&second)];
        all.sort();
        assert_eq!(all, vec![vec![10, 11], vec![20]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_buffered_groups() {
        let (c, mut rx, _) = coalescer();
        c.on_new_item(grouped(9, "B"));
        c.on_new_item(grouped(4, "A"));
        c.on_new_item(grouped(2, "A"));

        c.shutdown();

        assert_eq!(ids(&rx.recv().await.unwrap()), vec![2, 4]);
        assert_eq!(ids(&rx.recv().await.unwrap()), vec![9]);
        assert!(rx.recv().await.is_none());

        // Dropped, and the aborted timers never fire
        c.on_new_item(grouped(1, "A"));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(c.pending_groups(), 0);
    }
}
