//! Watch-fed cache of build records.
//!
//! The [`Informer`] is the only writer: it applies [`WatchEvent`]s to the
//! [`BuildCache`] and enqueues the keys of newly created builds. Workers read
//! the cache concurrently; a read returns the record as of the last applied
//! event.

use brigade_core::{BuildRecord, RecordKey, WatchEvent};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::Notify;
use tracing::{debug, info};

use crate::queue::WorkQueue;

type Records = HashMap<RecordKey, Arc<BuildRecord>>;

#[derive(Debug, Default)]
struct CacheInner {
    records: RwLock<Records>,
    synced: AtomicBool,
    sync_notify: Notify,
}

/// Local mirror of the watched build records.
#[derive(Debug, Clone, Default)]
pub struct BuildCache {
    inner: Arc<CacheInner>,
}

impl BuildCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Records> {
        self.inner
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Records> {
        self.inner
            .records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &RecordKey) -> Option<Arc<BuildRecord>> {
        self.read().get(key).cloned()
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<RecordKey> {
        let mut keys: Vec<_> = self.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether the initial list has been applied.
    pub fn has_synced(&self) -> bool {
        self.inner.synced.load(Ordering::Acquire)
    }

    /// Wait until the initial list has been applied.
    pub async fn wait_for_sync(&self) {
        loop {
            let notified = self.inner.sync_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.has_synced() {
                return;
            }
            notified.await;
        }
    }

    /// Insert or replace a record. Returns `true` if the key was not cached.
    fn upsert(&self, record: BuildRecord) -> bool {
        self.write()
            .insert(record.key(), Arc::new(record))
            .is_none()
    }

    fn remove(&self, key: &RecordKey) {
        self.write().remove(key);
    }

    fn replace(&self, records: Records) {
        *self.write() = records;
    }

    fn mark_synced(&self) {
        if !self.inner.synced.swap(true, Ordering::AcqRel) {
            self.inner.sync_notify.notify_waiters();
        }
    }
}

/// Applies watch events to a [`BuildCache`] and enqueues created builds.
///
/// Only creation is acted on: modifications refresh the cached copy and
/// deletions drop it, but neither enqueues anything.
#[derive(Debug)]
pub struct Informer {
    cache: BuildCache,
    queue: WorkQueue<RecordKey>,
    relist: Option<Relist>,
}

#[derive(Debug, Default)]
struct Relist {
    records: Records,
    created: Vec<RecordKey>,
}

impl Informer {
    pub fn new(cache: BuildCache, queue: WorkQueue<RecordKey>) -> Self {
        Self {
            cache,
            queue,
            relist: None,
        }
    }

    pub fn handle(&mut self, event: WatchEvent<BuildRecord>) {
        match event {
            WatchEvent::Applied(record) => {
                let key = record.key();
                if self.cache.upsert(record) {
                    debug!(build = %key, "Build created");
                    self.queue.add(key);
                }
            }
            WatchEvent::Deleted(record) => {
                let key = record.key();
                debug!(build = %key, "Build deleted");
                self.cache.remove(&key);
            }
            WatchEvent::RelistStarted => {
                self.relist = Some(Relist::default());
            }
            WatchEvent::Relisted(record) => {
                let key = record.key();
                let relist = self.relist.get_or_insert_with(Relist::default);
                if !self.cache.contains(&key) {
                    relist.created.push(key.clone());
                }
                relist.records.insert(key, Arc::new(record));
            }
            WatchEvent::RelistDone => {
                let relist = self.relist.take().unwrap_or_default();
                info!(
                    builds = relist.records.len(),
                    new = relist.created.len(),
                    "Build list synced"
                );
                // Swap first so workers never pop a key the cache lacks.
                self.cache.replace(relist.records);
                for key in relist.created {
                    self.queue.add(key);
                }
                self.cache.mark_synced();
            }
        }
    }

    /// Apply events until the stream ends.
    pub async fn run<S>(mut self, events: S)
    where
        S: Stream<Item = WatchEvent<BuildRecord>>,
    {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            self.handle(event);
        }
        info!("Build watch ended");
    }
}
