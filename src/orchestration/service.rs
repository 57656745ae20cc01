// Relay service: coalescer in front, one sequential worker behind

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::core::types::IncomingItem;
use crate::orchestration::coalescer::GroupCoalescer;
use crate::pipeline::PostPipeline;
use crate::utils::Metrics;

pub struct RelayService {
    coalescer: GroupCoalescer,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RelayService {
    /// Start the worker; groups are processed one at a time, in flush order
    pub fn start(pipeline: Arc<PostPipeline>, debounce: Duration, metrics: Metrics) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<IncomingItem>>();
        let coalescer = GroupCoalescer::new(debounce, tx, metrics);

        let worker = tokio::spawn(async move {
            while let Some(group) = rx.recv().await {
                let outcome = pipeline.handle(group).await;
                debug!("Group done: {:?}", outcome);
            }
            info!("Relay worker drained");
        });

        info!("Relay service started (debounce {}ms)", debounce.as_millis());
        Self {
            coalescer,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn on_new_item(&self, item: IncomingItem) {
        self.coalescer.on_new_item(item);
    }

    /// Flush what is buffered, then wait until the worker has published it
    pub async fn shutdown(&self) {
        self.coalescer.shutdown();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Relay worker ended abnormally: {}", e);
            }
        }
        info!("Relay service stopped");
    }
}
