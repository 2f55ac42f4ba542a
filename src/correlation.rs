//! Request/response correlation.
//!
//! Waiters register under a `(functional domain, attribute)` key and receive
//! the next decoded record carrying that key. Every waiter registered when the
//! record arrives is resolved with it (fan-out). A waiter that times out only
//! removes itself.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::warn;

use crate::codec::DecodedRecord;
use crate::protocol::FunctionalDomain;

/// Correlation key: functional domain plus attribute selector.
pub type ResponseKey = (FunctionalDomain, u8);

type Waiter = (u64, oneshot::Sender<DecodedRecord>);

/// Table of outstanding waiters.
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiters: Mutex<HashMap<ResponseKey, Vec<Waiter>>>,
    next_id: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the next record with `key`, or `None` after `timeout`.
    ///
    /// Also resolves to `None` when the table is cleared by [`cancel_all`].
    ///
    /// [`cancel_all`]: PendingRequests::cancel_all
    pub async fn wait_for(&self, key: ResponseKey, timeout: Duration) -> Option<DecodedRecord> {
        let (id, rx) = self.register(key);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(record)) => Some(record),
            Ok(Err(_)) => None,
            Err(_) => {
                self.remove(key, id);
                warn!(
                    functional_domain = ?key.0,
                    attribute = key.1,
                    ?timeout,
                    "Timed out waiting for response"
                );
                None
            }
        }
    }

    fn register(&self, key: ResponseKey) -> (u64, oneshot::Receiver<DecodedRecord>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let mut waiters = self.lock();
        waiters.entry(key).or_default().push((id, tx));
        (id, rx)
    }

    fn remove(&self, key: ResponseKey, id: u64) {
        let mut waiters = self.lock();
        if let Some(list) = waiters.get_mut(&key) {
            list.retain(|(waiter_id, _)| *waiter_id != id);
            if list.is_empty() {
                waiters.remove(&key);
            }
        }
    }

    /// Resolve every waiter registered under the record's key.
    ///
    /// Returns the number of waiters that received the record.
    pub fn resolve(&self, record: &DecodedRecord) -> usize {
        let Some(list) = self.lock().remove(&record.key()) else {
            return 0;
        };

        list.into_iter()
            .filter_map(|(_, tx)| tx.send(record.clone()).ok())
            .count()
    }

    /// Drop every waiter; their calls return `None`.
    pub fn cancel_all(&self) -> usize {
        let mut waiters = self.lock();
        let count = waiters.values().map(Vec::len).sum();
        waiters.clear();
        count
    }

    /// Number of outstanding waiters across all keys.
    pub fn len(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ResponseKey, Vec<Waiter>>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.waiters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use crate::protocol::{build_frame, Action};
    use std::sync::Arc;

    fn record(domain: FunctionalDomain, attribute: u8, data: &[u8]) -> DecodedRecord {
        let bytes = build_frame(1, Action::ReadResponse, domain, attribute, data).unwrap();
        decode(&bytes).remove(0)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_resolves_matching_waiter() {
        let pending = Arc::new(PendingRequests::new());
        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move {
                pending
                    .wait_for((FunctionalDomain::Control, 7), Duration::from_secs(5))
                    .await
            })
        };
        settle().await;
        assert_eq!(pending.len(), 1);

        let resolved = pending.resolve(&record(FunctionalDomain::Control, 7, &[1, 2, 3, 4, 5]));
        assert_eq!(resolved, 1);

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.key(), (FunctionalDomain::Control, 7));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_to_all_waiters() {
        let pending = Arc::new(PendingRequests::new());
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let pending = pending.clone();
            waiters.push(tokio::spawn(async move {
                pending
                    .wait_for((FunctionalDomain::Status, 2), Duration::from_secs(5))
                    .await
            }));
        }
        settle().await;

        assert_eq!(pending.resolve(&record(FunctionalDomain::Status, 2, &[1])), 3);
        for waiter in waiters {
            assert!(waiter.await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_other_keys_untouched() {
        let pending = Arc::new(PendingRequests::new());
        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move {
                pending
                    .wait_for((FunctionalDomain::Control, 1), Duration::from_millis(100))
                    .await
            })
        };
        settle().await;

        assert_eq!(pending.resolve(&record(FunctionalDomain::Status, 2, &[1])), 0);
        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_timeout_removes_only_itself() {
        let pending = Arc::new(PendingRequests::new());
        let short = {
            let pending = pending.clone();
            tokio::spawn(async move {
                pending
                    .wait_for((FunctionalDomain::Control, 7), Duration::from_millis(20))
                    .await
            })
        };
        let long = {
            let pending = pending.clone();
            tokio::spawn(async move {
                pending
                    .wait_for((FunctionalDomain::Control, 7), Duration::from_secs(5))
                    .await
            })
        };

        assert!(short.await.unwrap().is_none());
        assert_eq!(pending.len(), 1);

        // A late record reaches only the waiter still registered
        assert_eq!(pending.resolve(&record(FunctionalDomain::Control, 7, &[1, 2, 3, 4, 5])), 1);
        assert!(long.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_resolve_skips_abandoned_waiters() {
        let pending = Arc::new(PendingRequests::new());
        let spawn_waiter = |pending: Arc<PendingRequests>| {
            tokio::spawn(async move {
                pending
                    .wait_for((FunctionalDomain::Identification, 2), Duration::from_secs(5))
                    .await
            })
        };
        let abandoned = spawn_waiter(pending.clone());
        let live = spawn_waiter(pending.clone());
        settle().await;

        // Aborting drops the receiver but leaves the sender registered
        abandoned.abort();
        settle().await;
        assert_eq!(pending.len(), 2);

        let delivered = pending.resolve(&record(FunctionalDomain::Identification, 2, &[1, 2, 3, 4, 5, 6]));
        assert_eq!(delivered, 1);
        assert!(live.await.unwrap().is_some());
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all_returns_none() {
        let pending = Arc::new(PendingRequests::new());
        let waiter = {
            let pending = pending.clone();
            tokio::spawn(async move {
                pending
                    .wait_for((FunctionalDomain::Sensors, 2), Duration::from_secs(5))
                    .await
            })
        };
        settle().await;

        assert_eq!(pending.cancel_all(), 1);
        assert!(waiter.await.unwrap().is_none());
        assert!(pending.is_empty());
    }
}
