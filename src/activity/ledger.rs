use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::instrument;

/// Per-chatter message counts, keyed by lower-cased username.
///
/// Lives for the process lifetime only. Shared between the chat ingest task (writer) and the
/// command handler (reader) behind an `Arc`; every operation takes the lock exactly once, so an
/// increment is never observed half-applied.
#[derive(Debug, Default)]
pub struct ActivityLedger {
    counts: RwLock<HashMap<String, u64>>,
}

impl ActivityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one message for `username`, returning the updated total.
    #[instrument(skip(self))]
    pub async fn record_message(&self, username: &str) -> u64 {
        let mut counts = self.counts.write().await;
        let count = counts.entry(normalize(username)).or_insert(0);
        *count += 1;

        *count
    }

    pub async fn count(&self, username: &str) -> u64 {
        self.counts
            .read()
            .await
            .get(&normalize(username))
            .copied()
            .unwrap_or(0)
    }

    /// Number of distinct chatters seen so far.
    pub async fn len(&self) -> usize {
        self.counts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[inline]
fn normalize(username: &str) -> String {
    username.trim().to_lowercase()
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_unknown_user_is_zero() {
        let ledger = ActivityLedger::new();

        assert_eq!(ledger.count("nobody").await, 0);
        assert!(ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_counts_are_case_insensitive() {
        let ledger = ActivityLedger::new();

        assert_eq!(ledger.record_message("Alice").await, 1);
        assert_eq!(ledger.record_message("alice").await, 2);
        assert_eq!(ledger.record_message("ALICE").await, 3);
        ledger.record_message("bob").await;

        assert_eq!(ledger.count("aLiCe").await, 3);
        assert_eq!(ledger.count("Bob").await, 1);
        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let ledger = Arc::new(ActivityLedger::new());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    let name = if i % 2 == 0 { "Fisher" } else { "fisher" };
                    for _ in 0..250 {
                        ledger.record_message(name).await;
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ledger.count("FISHER").await, 2000);
        assert_eq!(ledger.len().await, 1);
    }
}
