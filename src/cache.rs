//! Single-flight thumbnail cache
//!
//! [`ThumbnailCache`] maps keys to finished thumbnails. A miss starts exactly
//! one production per key; every caller that misses while it runs waits on the
//! same shared handle and receives the same outcome. Successful results are
//! stored under a size-weighted LRU bound, failures are never stored.

use crate::{format_bytes, format_duration, CacheMetrics, Producer, SizedLru, ThumbnailError};
use bytes::Bytes;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

type Outcome = Result<Bytes, ThumbnailError>;
type Production = Shared<BoxFuture<'static, Outcome>>;

struct CacheState {
    entries: SizedLru,
    in_flight: HashMap<String, Production>,
}

struct Inner {
    state: Mutex<CacheState>,
    producer: Arc<dyn Producer>,
    metrics: CacheMetrics,
}

/// Point-in-time view of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub cost: usize,
    pub capacity: usize,
    pub in_flight: usize,
}

/// Size-bounded, single-flight cache in front of a [`Producer`].
///
/// Cloning is cheap and every clone shares the same state.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use webshot::{CacheMetrics, ThumbnailCache, Producer};
///
/// async fn serve(producer: Arc<dyn Producer>) {
///     let cache = ThumbnailCache::new(256 * 1024 * 1024, producer, CacheMetrics::noop());
///     match cache.get("abc123@v1").await {
///         Ok(png) => println!("{} bytes", png.len()),
///         Err(e) => eprintln!("no thumbnail: {e}"),
///     }
/// }
/// ```
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<Inner>,
}

impl ThumbnailCache {
    pub fn new(capacity: usize, producer: Arc<dyn Producer>, metrics: CacheMetrics) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState {
                    entries: SizedLru::new(capacity),
                    in_flight: HashMap::new(),
                }),
                producer,
                metrics,
            }),
        }
    }

    /// Return the thumbnail for `key`, producing it if necessary.
    pub async fn get(&self, key: &str) -> Result<Bytes, ThumbnailError> {
        let production = {
            let mut state = self.inner.state.lock();

            if let Some(artifact) = state.entries.get(key) {
                self.inner.metrics.hits.increment(1);
                debug!("Cache hit for {}", key);
                return Ok(artifact);
            }
            self.inner.metrics.misses.increment(1);

            let existing = state.in_flight.get(key).cloned();
            match existing {
                Some(production) => {
                    self.inner.metrics.coalesced.increment(1);
                    debug!("Joining in-flight production for {}", key);
                    production
                }
                None => {
                    let production = self.start_production(key);
                    state.in_flight.insert(key.to_string(), production.clone());
                    production
                }
            }
        };

        production.await
    }

    /// Spawn the production for `key`. The task drives the shared future to
    /// completion even if every waiter goes away, so the result still lands
    /// in the cache.
    ///
    /// A panicking producer settles like a failed one: the in-flight record is
    /// retired and every waiter gets an error.
    fn start_production(&self, key: &str) -> Production {
        let inner = Arc::clone(&self.inner);
        let key = key.to_string();

        let production = async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(inner.producer.produce(&key))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(panicked(panic)));
            inner.settle(&key, &outcome, started.elapsed());
            outcome
        }
        .boxed()
        .shared();

        tokio::spawn(production.clone());
        production
    }

    /// Presence check that does not affect recency.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.lock().entries.contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            entries: state.entries.len(),
            cost: state.entries.cost(),
            capacity: state.entries.capacity(),
            in_flight: state.in_flight.len(),
        }
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> ThumbnailError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    ThumbnailError::UpstreamCapture(format!("production panicked: {message}"))
}

impl Inner {
    /// Retire the in-flight record and, on success, store the artifact. Runs
    /// as one critical section so a later caller sees either the record or
    /// the stored result, never neither.
    fn settle(&self, key: &str, outcome: &Outcome, elapsed: Duration) {
        let (evicted, entries, cost) = {
            let mut state = self.state.lock();
            state.in_flight.remove(key);

            let evicted = match outcome {
                Ok(artifact) => state.entries.insert(key.to_string(), artifact.clone()),
                Err(_) => Vec::new(),
            };
            (evicted, state.entries.len(), state.entries.cost())
        };

        self.metrics.record_production(elapsed, outcome.is_ok());
        self.metrics.evictions.increment(evicted.len() as u64);
        self.metrics.record_occupancy(entries, cost);

        match outcome {
            Ok(artifact) => {
                info!(
                    "Cached {} ({}) after {}; {} entries, {} total",
                    key,
                    format_bytes(artifact.len()),
                    format_duration(elapsed),
                    entries,
                    format_bytes(cost)
                );
                if !evicted.is_empty() {
                    info!("Evicted {} entries: {:?}", evicted.len(), evicted);
                }
            }
            Err(e) => warn!(
                "Not caching {} ({:?} severity): {}",
                key,
                e.severity(),
                e
            ),
        }
    }
}
