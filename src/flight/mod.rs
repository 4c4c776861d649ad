//! Request Coalescing Module
//!
//! Deduplicates concurrent equivalent work under a shared key: no matter how
//! many callers ask for the same key at once, the supplied future runs once
//! and every caller observes the same outcome. Used by the namespace layer
//! to guarantee a single origin call per key under concurrent demand.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

/// The shared result of a coalesced call. Errors are reference-counted so
/// every waiter can own the same failure.
pub type Outcome<T> = Result<T, Arc<anyhow::Error>>;

type Slot<T> = Option<Outcome<T>>;

enum Role<T> {
    /// First caller for the key: runs the work and publishes the outcome.
    Leader(watch::Sender<Slot<T>>),
    /// Late caller: waits for the leader's outcome.
    Waiter(watch::Receiver<Slot<T>>),
}

/// Per-key coalescing of in-progress calls.
///
/// The map holds at most one call per key and never retains completed
/// calls: the leader publishes its outcome and then removes the entry, so
/// at no point is a key unclaimed while its outcome is still unknown. A
/// caller arriving after the removal starts a fresh call.
pub struct Flight<T> {
    calls: Mutex<Option<HashMap<String, watch::Receiver<Slot<T>>>>>,
}

impl<T: Clone> Flight<T> {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(None),
        }
    }

    /// Runs `work` for `key`, unless a call for the same key is already in
    /// flight, in which case the caller waits for that call's outcome.
    ///
    /// The work future runs without the map lock held. If the leader is
    /// cancelled or panics before publishing, the entry is removed by a
    /// drop guard and every waiter receives an error instead of hanging.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let role = {
            let mut calls = self.calls.lock();
            let map = calls.get_or_insert_with(HashMap::new);
            match map.get(key) {
                Some(receiver) => Role::Waiter(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    map.insert(key.to_string(), receiver);
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Waiter(mut receiver) => loop {
                if let Some(outcome) = receiver.borrow().as_ref() {
                    return outcome.clone();
                }
                if receiver.changed().await.is_err() {
                    return Err(Arc::new(anyhow::anyhow!(
                        "in-flight load for key {key:?} was abandoned"
                    )));
                }
            },
            Role::Leader(sender) => {
                let guard = CallGuard { flight: self, key };
                let outcome = work().await.map_err(Arc::new);
                // Publish before deregistering: a caller landing in between
                // still finds the entry and joins this outcome instead of
                // re-running the work.
                let _ = sender.send(Some(outcome.clone()));
                drop(guard);
                outcome
            }
        }
    }
}

impl<T: Clone> Default for Flight<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes the call entry when the leader finishes, panics, or is cancelled.
struct CallGuard<'a, T> {
    flight: &'a Flight<T>,
    key: &'a str,
}

impl<T> Drop for CallGuard<'_, T> {
    fn drop(&mut self) {
        let mut calls = self.flight.calls.lock();
        if let Some(map) = calls.as_mut() {
            map.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let flight = Arc::new(Flight::new());
        let invocations = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..100)
            .map(|_| {
                let flight = flight.clone();
                let invocations = invocations.clone();
                tokio::spawn(async move {
                    flight
                        .run("key", || async {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            invocations.fetch_add(1, Ordering::SeqCst);
                            Ok("v".to_string())
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.unwrap(), "v");
        }
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_waiters_observe_the_same_error() {
        let flight = Arc::new(Flight::<String>::new());

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let flight = flight.clone();
                tokio::spawn(async move {
                    flight
                        .run("key", || async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Err(anyhow::anyhow!("origin is down"))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_eq!(outcome.unwrap_err().to_string(), "origin is down");
        }
    }

    #[tokio::test]
    async fn test_completed_calls_are_not_cached() {
        let flight = Flight::new();
        let invocations = AtomicUsize::new(0);

        for _ in 0..3 {
            let outcome = flight
                .run("key", || async {
                    invocations.fetch_add(1, Ordering::SeqCst);
                    Ok(42u32)
                })
                .await;
            assert_eq!(outcome.unwrap(), 42);
        }

        // Sequential calls never overlap, so each one runs the work.
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_abandoned_leader_fails_waiters() {
        let flight = Arc::new(Flight::<String>::new());

        let leader = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok("never".to_string())
                    })
                    .await
            })
        };

        // Give the leader time to claim the key, then kill it mid-flight.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let waiter = {
            let flight = flight.clone();
            tokio::spawn(async move {
                flight
                    .run("key", || async { Ok("fresh".to_string()) })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        let outcome = waiter.await.unwrap();
        assert!(outcome.unwrap_err().to_string().contains("abandoned"));
    }
}
