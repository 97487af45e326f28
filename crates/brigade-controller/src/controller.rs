//! Controller runner: informer, workers and shutdown.

use brigade_config::ControllerConfig;
use brigade_core::{BuildRecord, RecordKey, Substrate, WatchEvent};
use futures::Stream;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{BuildCache, Informer};
use crate::queue::WorkQueue;
use crate::reconciler::Reconciler;
use crate::retry::{ErrorSink, RetryPolicy, TracingErrorSink};

/// Watches builds and reconciles them on a pool of workers.
pub struct BuildController {
    cache: BuildCache,
    queue: WorkQueue<RecordKey>,
    reconciler: Reconciler,
    retry: RetryPolicy,
    workers: usize,
}

impl BuildController {
    pub fn new(substrate: Arc<dyn Substrate>, config: Arc<ControllerConfig>) -> Self {
        Self::with_parts(substrate, config, WorkQueue::new(), Arc::new(TracingErrorSink))
    }

    /// Create a controller with an explicit queue and error sink.
    pub fn with_parts(
        substrate: Arc<dyn Substrate>,
        config: Arc<ControllerConfig>,
        queue: WorkQueue<RecordKey>,
        sink: Arc<dyn ErrorSink>,
    ) -> Self {
        let cache = BuildCache::new();
        let workers = config.workers.max(1);
        Self {
            reconciler: Reconciler::new(cache.clone(), substrate, config),
            retry: RetryPolicy::new(sink),
            cache,
            queue,
            workers,
        }
    }

    pub fn cache(&self) -> &BuildCache {
        &self.cache
    }

    pub fn queue(&self) -> &WorkQueue<RecordKey> {
        &self.queue
    }

    /// An informer feeding this controller's cache and queue.
    pub fn informer(&self) -> Informer {
        Informer::new(self.cache.clone(), self.queue.clone())
    }

    /// Process one key. Returns `false` once the queue has shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let result = self.reconciler.sync(&key).await;
        self.retry.handle(&self.queue, &key, result);
        self.queue.done(&key);
        true
    }

    async fn run_worker(&self, id: usize) {
        debug!(worker = id, "Starting worker");
        while self.process_next().await {}
        debug!(worker = id, "Worker stopped");
    }

    /// Run until `shutdown` resolves.
    ///
    /// Workers start once the initial list has been applied to the cache.
    /// On shutdown the watch is dropped, the queue stops handing out keys and
    /// every worker finishes its current key before this returns.
    pub async fn run<S, F>(self, events: S, shutdown: F)
    where
        S: Stream<Item = WatchEvent<BuildRecord>> + Send + 'static,
        F: Future<Output = ()>,
    {
        let informer = tokio::spawn(self.informer().run(events));
        tokio::pin!(shutdown);

        info!("Waiting for build cache to sync");
        tokio::select! {
            _ = self.cache.wait_for_sync() => {}
            _ = &mut shutdown => {
                informer.abort();
                self.queue.shutdown();
                info!("Shut down before build cache synced");
                return;
            }
        }

        info!(workers = self.workers, "Starting build controller");
        let this = Arc::new(self);
        let workers: Vec<_> = (0..this.workers)
            .map(|id| {
                let controller = Arc::clone(&this);
                tokio::spawn(async move { controller.run_worker(id).await })
            })
            .collect();

        shutdown.await;
        info!("Shutting down build controller");
        informer.abort();
        this.queue.shutdown();
        for worker in workers {
            let _ = worker.await;
        }
        info!("Build controller stopped");
    }
}
