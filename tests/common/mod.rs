//! Shared test harness: one store, one collector pipeline, driven by hand

#![allow(dead_code)]

use cascade_gc::{
    CancellationToken, DirtyQueue, EventIngestor, GcMetrics, ItemProcessor, MemoryStore, ObjectGraph,
    ObjectIdentity, ObjectSnapshot, OwnerReference, WatchEvent,
};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on processed items before `settle` gives up
pub const MAX_STEPS: usize = 1_000;

pub fn id(name: &str) -> ObjectIdentity {
    ObjectIdentity::new("v1", "ConfigMap", name, format!("uid-{}", name)).with_namespace("default")
}

pub fn object(name: &str) -> ObjectSnapshot {
    ObjectSnapshot::new(id(name))
}

pub fn owned_by(name: &str, owner: &str, blocking: bool) -> ObjectSnapshot {
    let reference = if blocking {
        OwnerReference::blocking(id(owner))
    } else {
        OwnerReference::non_blocking(id(owner))
    };
    object(name).with_owner(reference)
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub graph: Arc<ObjectGraph>,
    pub queue: Arc<DirtyQueue<ObjectIdentity>>,
    pub metrics: Arc<GcMetrics>,
    pub ingestor: EventIngestor,
    pub processor: ItemProcessor,
    pub token: CancellationToken,
    events: flume::Receiver<WatchEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new(), Duration::from_secs(1))
    }

    pub fn with_store(store: MemoryStore, store_timeout: Duration) -> Self {
        let store = Arc::new(store);
        let graph = Arc::new(ObjectGraph::new());
        let queue = Arc::new(DirtyQueue::new(Duration::from_millis(1), Duration::from_millis(20)));
        let metrics = Arc::new(GcMetrics::new());
        let token = CancellationToken::new();
        let ingestor = EventIngestor::new(graph.clone(), queue.clone(), metrics.clone());
        let processor = ItemProcessor::new(
            graph.clone(),
            queue.clone(),
            store.clone(),
            metrics.clone(),
            store_timeout,
            token.clone(),
        );
        let events = store.watch();

        Self {
            store,
            graph,
            queue,
            metrics,
            ingestor,
            processor,
            token,
            events,
        }
    }

    /// Ingest every event the store emitted so far
    pub fn pump(&self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.events.try_recv() {
            self.ingestor.ingest(event).expect("queue open");
            count += 1;
        }
        count
    }

    /// Process one queued item, if any
    pub async fn step(&self) -> bool {
        self.pump();
        if self.queue.is_empty() {
            return false;
        }
        self.processor.process_next().await.expect("queue open");
        true
    }

    /// Alternate ingestion and processing until nothing is left to do
    ///
    /// Returns the number of processed items.
    pub async fn settle(&self) -> usize {
        let mut steps = 0;
        let mut waits = 0;
        while steps < MAX_STEPS && waits < MAX_STEPS {
            if self.step().await {
                steps += 1;
                continue;
            }
            if self.queue.is_idle() && self.events.is_empty() {
                break;
            }
            // delayed retries pending
            waits += 1;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        self.pump();
        steps
    }
}
