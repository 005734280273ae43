//! Singleflight - per-key coalescing of concurrent computations
//!
//! The first caller for a key becomes the leader and runs the computation;
//! callers arriving while it is in flight subscribe to a broadcast channel
//! and receive the leader's value instead of recomputing. The in-flight
//! entry is removed on completion, so sequential calls are never
//! coalesced. If the leader is cancelled mid-flight its guard drops the
//! entry, the channel closes, and each follower falls back to computing
//! for itself.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use tokio::sync::broadcast;

use super::lock;

/// Per-key in-flight computation map
pub struct Singleflight<V> {
    inflight: Mutex<HashMap<String, broadcast::Sender<V>>>,
}

impl<V> std::fmt::Debug for Singleflight<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Singleflight")
            .field("in_flight", &lock(&self.inflight).len())
            .finish()
    }
}

impl<V: Clone + Send + 'static> Default for Singleflight<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + 'static> Singleflight<V> {
    /// Create an empty coalescer
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Number of computations currently in flight
    pub fn in_flight(&self) -> usize {
        lock(&self.inflight).len()
    }

    /// Run `compute` for `key`, or await an identical in-flight run
    pub async fn run<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let receiver = {
            let mut inflight = lock(&self.inflight);
            match inflight.get(key) {
                Some(sender) => Some(sender.subscribe()),
                None => {
                    let (sender, _) = broadcast::channel(1);
                    inflight.insert(key.to_string(), sender);
                    None
                }
            }
        };

        if let Some(mut receiver) = receiver {
            return match receiver.recv().await {
                Ok(value) => value,
                // Leader went away without delivering; compute ourselves
                Err(_) => compute().await,
            };
        }

        let guard = LeadGuard {
            flight: self,
            key: key.to_string(),
            completed: false,
        };
        let value = compute().await;
        guard.complete(value.clone());
        value
    }
}

/// Removes the in-flight entry when the leader finishes or is dropped
struct LeadGuard<'a, V> {
    flight: &'a Singleflight<V>,
    key: String,
    completed: bool,
}

impl<'a, V: Clone> LeadGuard<'a, V> {
    fn complete(mut self, value: V) {
        if let Some(sender) = lock(&self.flight.inflight).remove(&self.key) {
            // No followers is fine; the error only means nobody subscribed
            let _ = sender.send(value);
        }
        self.completed = true;
    }
}

impl<'a, V> Drop for LeadGuard<'a, V> {
    fn drop(&mut self) {
        if !self.completed {
            lock(&self.flight.inflight).remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_calls_coalesce() {
        let flight = Arc::new(Singleflight::<u64>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..3 {
            let flight = Arc::clone(&flight);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                flight
                    .run("monthly-2024-01", || async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        executions.fetch_add(1, Ordering::SeqCst);
                        42u64
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 42);
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_separately() {
        let flight = Singleflight::<u64>::new();
        let executions = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let executions = Arc::clone(&executions);
            let value = flight
                .run("key", || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    7u64
                })
                .await;
            assert_eq!(value, 7);
        }

        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_follower_recovers_from_cancelled_leader() {
        let flight = Arc::new(Singleflight::<u64>::new());

        let leader_flight = Arc::clone(&flight);
        let leader = tokio::spawn(async move {
            leader_flight
                .run("key", || async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    1u64
                })
                .await
        });
        tokio::task::yield_now().await;
        assert_eq!(flight.in_flight(), 1);

        let follower_flight = Arc::clone(&flight);
        let follower = tokio::spawn(async move {
            follower_flight.run("key", || async { 2u64 }).await
        });
        tokio::task::yield_now().await;

        leader.abort();
        assert_eq!(follower.await.unwrap(), 2);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_independently() {
        let flight = Arc::new(Singleflight::<u64>::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..2 {
            let flight = Arc::clone(&flight);
            let executions = Arc::clone(&executions);
            handles.push(tokio::spawn(async move {
                flight
                    .run(&format!("key-{i}"), || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        executions.fetch_add(1, Ordering::SeqCst);
                        i
                    })
                    .await
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }
}
