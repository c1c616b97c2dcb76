//! Garbage collector controller
//!
//! Wires the graph, the work queue, one ingestion task and a pool of
//! workers together and owns their lifetime.

use crate::config::GcConfig;
use crate::errors::{GcError, StoreError};
use crate::graph::ObjectGraph;
use crate::infrastructure::{CancellationToken, GcMetrics, TaskScope};
use crate::ingest::{BlockingAuthorizer, EventIngestor};
use crate::object::{DeleteOptions, ObjectIdentity, WatchEvent};
use crate::processor::ItemProcessor;
use crate::queue::DirtyQueue;
use crate::store::ObjectStore;
use futures::Stream;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct GarbageCollector {
    config: GcConfig,
    store: Arc<dyn ObjectStore>,
    graph: Arc<ObjectGraph>,
    queue: Arc<DirtyQueue<ObjectIdentity>>,
    metrics: Arc<GcMetrics>,
    ingestor: Arc<EventIngestor>,
    processor: Arc<ItemProcessor>,
    token: CancellationToken,
    tasks: TaskScope,
}

impl GarbageCollector {
    pub fn new(store: Arc<dyn ObjectStore>, config: GcConfig) -> Self {
        Self::build(store, config, None)
    }

    /// Collector whose ingestion consults `authorizer` for blocking references
    pub fn with_authorizer(
        store: Arc<dyn ObjectStore>,
        config: GcConfig,
        authorizer: Arc<dyn BlockingAuthorizer>,
    ) -> Self {
        Self::build(store, config, Some(authorizer))
    }

    fn build(
        store: Arc<dyn ObjectStore>,
        config: GcConfig,
        authorizer: Option<Arc<dyn BlockingAuthorizer>>,
    ) -> Self {
        let graph = Arc::new(ObjectGraph::new());
        let queue = Arc::new(DirtyQueue::new(config.base_delay(), config.max_delay()));
        let metrics = Arc::new(GcMetrics::new());
        let token = CancellationToken::new();

        let mut ingestor = EventIngestor::new(graph.clone(), queue.clone(), metrics.clone());
        if let Some(authorizer) = authorizer {
            ingestor = ingestor.with_authorizer(authorizer);
        }
        let processor = ItemProcessor::new(
            graph.clone(),
            queue.clone(),
            store.clone(),
            metrics.clone(),
            config.store_timeout(),
            token.clone(),
        );

        Self {
            config,
            store,
            graph,
            queue,
            metrics,
            ingestor: Arc::new(ingestor),
            processor: Arc::new(processor),
            token,
            tasks: TaskScope::new(),
        }
    }

    /// Spawn the ingestion task for `events` and the worker pool
    pub fn start<S>(&self, events: S)
    where
        S: Stream<Item = WatchEvent> + Send + 'static,
    {
        let workers = self.config.workers.count.max(1);
        info!(workers, "starting garbage collector");

        let ingestor = self.ingestor.clone();
        let token = self.token.clone();
        self.tasks.spawn(async move { ingestor.run(events, token).await });

        for _ in 0..workers {
            let processor = self.processor.clone();
            self.tasks.spawn(async move { processor.run().await });
        }
    }

    /// Request deletion of an object
    ///
    /// Conflicting options are rejected before the graph or the store is
    /// touched. The object disappears once the store and the collector have
    /// finished with it.
    #[instrument(skip(self, identity), fields(object = %identity))]
    pub async fn delete(&self, identity: &ObjectIdentity, options: DeleteOptions) -> Result<(), GcError> {
        options.validate()?;

        let timeout = self.config.store_timeout();
        match tokio::time::timeout(timeout, self.store.delete(identity, options)).await {
            Ok(result) => result.map_err(GcError::from),
            Err(_) => Err(StoreError::Timeout(timeout).into()),
        }
    }

    /// Stop ingestion and workers and wait for every task
    pub async fn shutdown(&self) {
        info!("shutting down garbage collector");
        self.queue.shut_down();
        self.token.cancel();
        self.tasks.join_all().await;
        info!("garbage collector stopped\n{}", self.metrics.summary().report());
    }

    pub fn graph(&self) -> &Arc<ObjectGraph> {
        &self.graph
    }

    pub fn queue(&self) -> &Arc<DirtyQueue<ObjectIdentity>> {
        &self.queue
    }

    pub fn metrics(&self) -> &Arc<GcMetrics> {
        &self.metrics
    }

    pub fn ingestor(&self) -> &EventIngestor {
        &self.ingestor
    }

    pub fn processor(&self) -> &ItemProcessor {
        &self.processor
    }

    pub fn config(&self) -> &GcConfig {
        &self.config
    }
}
