//! Collapses concurrent fetches of the same URL into one.
//!
//! Only outcomes are tracked here; bytes live in the byte cache. Joiners
//! wait on a shared `watch` channel instead of polling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::errors::LoadError;

/// Default lifetime of a recorded failure.
pub const DEFAULT_FAILURE_TTL: Duration = Duration::from_secs(5 * 60);

type Outcome = Result<(), LoadError>;

enum Slot {
    Pending(watch::Receiver<Option<Outcome>>),
    Succeeded,
    Failed { error: LoadError, at: Instant },
}

/// At most one in-flight operation per key; every caller sees its outcome.
///
/// Settled outcomes are remembered: later loads of a succeeded key return
/// at once, failed keys return their error until `forget` or the failure
/// TTL lapses.
pub struct RequestCoalescer {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    failure_ttl: Duration,
}

impl std::fmt::Debug for RequestCoalescer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("failure_ttl", &self.failure_ttl)
            .field("len", &self.len())
            .finish()
    }
}

impl Default for RequestCoalescer {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_TTL)
    }
}

impl RequestCoalescer {
    /// Creates a coalescer remembering failures for `failure_ttl`.
    #[must_use]
    pub fn new(failure_ttl: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            failure_ttl,
        }
    }

    /// Runs `op` for `key` unless it already ran or is running, and returns
    /// the shared outcome.
    ///
    /// The operation runs on its own task, so it completes for the other
    /// callers even if this caller is dropped.
    ///
    /// # Errors
    /// Returns the recorded failure of the operation.
    pub async fn load<F, Fut>(&self, key: &str, op: F) -> Result<(), LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let (rx, leader) = {
            let mut slots = self.slots.lock();
            match slots.get(key) {
                Some(Slot::Succeeded) => {
                    trace!(key = key, "Coalescer: already succeeded");
                    return Ok(());
                }
                Some(Slot::Failed { error, at }) if at.elapsed() < self.failure_ttl => {
                    trace!(key = key, "Coalescer: already failed");
                    return Err(error.clone());
                }
                Some(Slot::Pending(rx)) if rx.has_changed().is_ok() => {
                    trace!(key = key, "Coalescer: joining in-flight request");
                    (rx.clone(), None)
                }
                _ => {
                    let (tx, rx) = watch::channel(None);
                    slots.insert(key.to_string(), Slot::Pending(rx.clone()));
                    (rx, Some(tx))
                }
            }
        };

        if let Some(tx) = leader {
            debug!(key = key, "Coalescer: starting request");
            let fut = op();
            let slots = Arc::clone(&self.slots);
            let key = key.to_string();
            tokio::spawn(async move {
                let outcome = fut.await;
                Self::settle(&slots, &key, &outcome);
                let _ = tx.send(Some(outcome));
            });
        }

        Self::wait(rx).await
    }

    fn settle(slots: &Mutex<HashMap<String, Slot>>, key: &str, outcome: &Outcome) {
        let mut slots = slots.lock();
        // Settled records are never overwritten.
        if !matches!(slots.get(key), Some(Slot::Pending(_))) {
            return;
        }

        let slot = match outcome {
            Ok(()) => Slot::Succeeded,
            Err(error) => Slot::Failed {
                error: error.clone(),
                at: Instant::now(),
            },
        };
        slots.insert(key.to_string(), slot);
    }

    async fn wait(mut rx: watch::Receiver<Option<Outcome>>) -> Outcome {
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => match &*outcome {
                Some(result) => result.clone(),
                None => Err(LoadError::aborted("request finished without an outcome")),
            },
            Err(_) => Err(LoadError::aborted("request task ended before completing")),
        }
    }

    /// Drops the settled outcome for `key` so the next load runs again.
    /// In-flight requests are left alone.
    pub fn forget(&self, key: &str) {
        let mut slots = self.slots.lock();
        if matches!(
            slots.get(key),
            Some(Slot::Succeeded | Slot::Failed { .. })
        ) {
            slots.remove(key);
            trace!(key = key, "Coalescer: forgot outcome");
        }
    }

    /// Drops every settled outcome.
    pub fn clear_settled(&self) {
        self.slots
            .lock()
            .retain(|_, slot| matches!(slot, Slot::Pending(_)));
    }

    /// Returns the number of in-flight requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Pending(_)))
            .count()
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
