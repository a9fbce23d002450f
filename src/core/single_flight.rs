//! Keyed single-flight coordination.
//!
//! The first caller for a key starts the operation; callers arriving while it
//! runs attach to the same shared future and receive a clone of its result.
//! The entry is removed by the operation itself when it completes, so the
//! next caller after completion starts fresh even if the original caller was
//! dropped.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type InFlight<V> = Shared<BoxFuture<'static, V>>;

/// Deduplicates concurrent operations by key.
pub struct SingleFlight<K, V>
where
    V: Clone,
{
    inflight: Arc<Mutex<HashMap<K, InFlight<V>>>>,
}

impl<K, V> Clone for SingleFlight<K, V>
where
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inflight: Arc::clone(&self.inflight),
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    V: Clone,
{
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Empty coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` for `key` unless an operation for `key` is in flight, in
    /// which case wait for that one instead.
    pub async fn run<F, Fut>(&self, key: K, make: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let shared = {
            let mut inflight = self.inflight.lock();
            if let Some(existing) = inflight.get(&key) {
                tracing::debug!("joining in-flight operation");
                existing.clone()
            } else {
                let registry = Arc::clone(&self.inflight);
                let own_key = key.clone();
                let work = make();
                let fut = async move {
                    let value = work.await;
                    registry.lock().remove(&own_key);
                    value
                }
                .boxed()
                .shared();
                inflight.insert(key, fut.clone());
                fut
            }
        };
        shared.await
    }

    /// Wait for the in-flight operation for `key`, if any.
    pub async fn wait(&self, key: &K) -> Option<V> {
        let existing = self.inflight.lock().get(key).cloned();
        match existing {
            Some(fut) => Some(fut.await),
            None => None,
        }
    }

    /// True while an operation for `key` is running.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.inflight.lock().contains_key(key)
    }
}
