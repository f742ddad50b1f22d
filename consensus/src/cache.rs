//! Result cache with single-flight deduplication.
//!
//! At most one computation runs per [`CacheKey`]. Callers arriving while it is
//! in flight subscribe to a `watch` channel and receive the same outcome.
//! Only successes are retained. If the computing caller is dropped before it
//! finishes, its guard removes the pending entry and closes the channel; any
//! waiter then loops and one of them takes over the computation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::engine::ConsensusResult;
use crate::error::JuryResult;

/// Identity of a cached result: one submission under one agent-set version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub submission_id: String,
    pub agent_set_version: String,
}

impl CacheKey {
    pub fn new(submission_id: &str, agent_set_version: &str) -> Self {
        Self {
            submission_id: submission_id.to_string(),
            agent_set_version: agent_set_version.to_string(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.submission_id, self.agent_set_version)
    }
}

type Outcome = JuryResult<Arc<ConsensusResult>>;

enum Slot {
    Ready(Arc<ConsensusResult>),
    Pending {
        generation: u64,
        rx: watch::Receiver<Option<Outcome>>,
    },
}

/// Process-wide memo of consensus results.
#[derive(Default)]
pub struct ResultCache {
    slots: Mutex<HashMap<CacheKey, Slot>>,
    next_generation: AtomicU64,
    computations: AtomicU64,
}

/// Thread-safe shared cache handle
pub type SharedResultCache = Arc<ResultCache>;

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedResultCache {
        Arc::new(Self::new())
    }

    // A panic while holding the lock cannot leave a slot half-written, so the
    // map is still usable after poisoning.
    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached result for `key`, or run `compute` exactly once
    /// across all concurrent callers.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = JuryResult<ConsensusResult>>,
    {
        let guard = loop {
            let mut rx = {
                let mut slots = self.lock();
                match slots.get(&key) {
                    Some(Slot::Ready(result)) => {
                        debug!(key = %key, "Result cache hit");
                        return Ok(Arc::clone(result));
                    }
                    Some(Slot::Pending { rx, .. }) => rx.clone(),
                    None => {
                        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                        let (tx, rx) = watch::channel(None);
                        slots.insert(key.clone(), Slot::Pending { generation, rx });
                        break InFlight {
                            cache: self,
                            key: key.clone(),
                            generation,
                            tx: Some(tx),
                        };
                    }
                }
            };

            debug!(key = %key, "Joining in-flight computation");
            let outcome = rx
                .wait_for(|value| value.is_some())
                .await
                .ok()
                .and_then(|value| value.clone());
            match outcome {
                Some(outcome) => return outcome,
                None => debug!(key = %key, "In-flight computation abandoned, retrying"),
            }
        };

        self.computations.fetch_add(1, Ordering::Relaxed);
        let outcome = compute().await.map(Arc::new);
        guard.finish(&outcome);
        outcome
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<ConsensusResult>> {
        match self.lock().get(key) {
            Some(Slot::Ready(result)) => Some(Arc::clone(result)),
            _ => None,
        }
    }

    /// Whether a finished result is cached for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        matches!(self.lock().get(key), Some(Slot::Pending { .. }))
    }

    /// Number of finished results held.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total computations started through [`get_or_compute`](Self::get_or_compute).
    pub fn computations(&self) -> u64 {
        self.computations.load(Ordering::Relaxed)
    }

    /// Seed the cache with previously persisted results. Existing entries win.
    pub fn warm(&self, results: impl IntoIterator<Item = ConsensusResult>) -> usize {
        let mut slots = self.lock();
        let mut added = 0;
        for result in results {
            let key = result.key();
            if !slots.contains_key(&key) {
                slots.insert(key, Slot::Ready(Arc::new(result)));
                added += 1;
            }
        }
        added
    }
}

/// Compute role for one key. Dropping it unfinished releases the key.
struct InFlight<'a> {
    cache: &'a ResultCache,
    key: CacheKey,
    generation: u64,
    tx: Option<watch::Sender<Option<Outcome>>>,
}

impl InFlight<'_> {
    fn owns(&self, slots: &HashMap<CacheKey, Slot>) -> bool {
        matches!(
            slots.get(&self.key),
            Some(Slot::Pending { generation, .. }) if *generation == self.generation
        )
    }

    fn finish(mut self, outcome: &Outcome) {
        {
            let mut slots = self.cache.lock();
            if self.owns(&slots) {
                match outcome {
                    Ok(result) => {
                        slots.insert(self.key.clone(), Slot::Ready(Arc::clone(result)));
                    }
                    Err(e) => {
                        debug!(key = %self.key, error = %e, "Computation failed, not caching");
                        slots.remove(&self.key);
                    }
                }
            }
        }
        if let Some(tx) = self.tx.take() {
            // No receivers is fine: nobody was waiting.
            let _ = tx.send(Some(outcome.clone()));
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.tx.is_none() {
            return;
        }
        let mut slots = self.cache.lock();
        if self.owns(&slots) {
            debug!(key = %self.key, "Computation dropped before completion, releasing key");
            slots.remove(&self.key);
        }
    }
}
