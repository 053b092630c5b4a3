//! Work queues: rate-limited, de-duplicating FIFOs, one per resource kind.
//!
//! A rate-limited, de-duplicating FIFO modeled on client-go's
//! `workqueue.RateLimitingInterface`: concurrent `add()`s of the same key
//! before it is dequeued collapse to one pending entry; a key already being
//! processed is tracked so a second worker can never dequeue it
//! concurrently (it is instead marked dirty and redelivered once `done()`
//! is called); `forget()` resets the per-key exponential backoff so a
//! successful sync doesn't leave a stale penalty for the next unrelated
//! failure.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub base: Duration,
    pub max: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl BackoffConfig {
    fn delay_for(&self, retries: u32) -> Duration {
        let exp = self.base.as_millis().saturating_mul(1u128 << retries.min(30));
        Duration::from_millis(exp.min(self.max.as_millis()) as u64)
    }
}

struct Inner<K> {
    queue: VecDeque<K>,
    queued: HashSet<K>,
    processing: HashSet<K>,
    dirty_while_processing: HashSet<K>,
    retries: std::collections::HashMap<K, u32>,
    shutting_down: bool,
}

/// A per-resource-kind work queue. `K` is the namespace/name (or bare name,
/// for cluster-scoped kinds) key.
pub struct WorkQueue<K: Eq + Hash + Clone + Send + 'static> {
    inner: Arc<Mutex<Inner<K>>>,
    notify: Arc<Notify>,
    backoff: BackoffConfig,
}

impl<K: Eq + Hash + Clone + Send + 'static> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        WorkQueue {
            inner: self.inner.clone(),
            notify: self.notify.clone(),
            backoff: self.backoff.clone(),
        }
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> WorkQueue<K> {
    pub fn new() -> Self {
        Self::with_backoff(BackoffConfig::default())
    }

    pub fn with_backoff(backoff: BackoffConfig) -> Self {
        WorkQueue {
            inner: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                dirty_while_processing: HashSet::new(),
                retries: std::collections::HashMap::new(),
                shutting_down: false,
            })),
            notify: Arc::new(Notify::new()),
            backoff,
        }
    }

    /// Enqueue `key` immediately. If already queued, this is a no-op
    /// (coalesced). If currently being processed, it is marked dirty so a
    /// fresh sync runs once the in-flight one finishes.
    pub async fn add(&self, key: K) {
        let mut inner = self.inner.lock().await;
        if inner.shutting_down {
            return;
        }
        if inner.processing.contains(&key) {
            inner.dirty_while_processing.insert(key);
            return;
        }
        if inner.queued.insert(key.clone()) {
            inner.queue.push_back(key);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Enqueue `key` after an exponential backoff delay keyed by the
    /// number of consecutive failures seen for it, so a failing key is
    /// retried with rate-limited backoff instead of hot-looping.
    pub fn add_rate_limited(&self, key: K) {
        let queue = self.clone();
        tokio::spawn(async move {
            let delay = {
                let mut inner = queue.inner.lock().await;
                let retries = inner.retries.entry(key.clone()).or_insert(0);
                *retries += 1;
                queue.backoff.delay_for(*retries - 1)
            };
            sleep(delay).await;
            queue.add(key).await;
        });
    }

    /// Reset the backoff counter for `key` once a sync succeeds, so the
    /// per-key penalty doesn't linger into the next unrelated failure.
    pub async fn forget(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.retries.remove(key);
    }

    /// Block until a key is available, then mark it in-flight and return
    /// it. Returns `None` once the queue has been shut down and drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.queue.pop_front() {
                    inner.queued.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark `key` as finished processing. If it was marked dirty while
    /// in-flight, it is re-enqueued now so the per-key serialization
    /// contract is preserved.
    pub async fn done(&self, key: &K) {
        let mut inner = self.inner.lock().await;
        inner.processing.remove(key);
        if inner.dirty_while_processing.remove(key) {
            if inner.queued.insert(key.clone()) {
                inner.queue.push_back(key.clone());
                drop(inner);
                self.notify.notify_one();
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.queue.len()
    }

    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_waiters();
    }
}

impl<K: Eq + Hash + Clone + Send + 'static> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
