//! Per-conversation turn serialization.
//!
//! A turn holds its conversation's lock from the user-message append to the
//! assistant-message append, so overlapping requests on one conversation run
//! one after the other and each sees the previous turn's messages.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dealroom_core::message::ConversationId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A conversation's lock and the number of turns holding or awaiting it.
struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type LockTable = HashMap<String, LockEntry>;

#[derive(Clone, Default)]
pub struct TurnLocks {
    table: Arc<Mutex<LockTable>>,
}

impl TurnLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `conversation_id`.
    ///
    /// Dropping the returned future before it resolves gives up the claim.
    pub async fn acquire(&self, conversation_id: &ConversationId) -> TurnGuard {
        let key = conversation_id.as_str().to_string();
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            let entry = table.entry(key.clone()).or_insert_with(|| LockEntry {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            entry.users += 1;
            entry.lock.clone()
        };
        let lease = Lease {
            key,
            table: self.table.clone(),
        };
        let guard = lock.lock_owned().await;
        TurnGuard {
            _guard: guard,
            _lease: lease,
        }
    }

    /// Conversations with a running or waiting turn.
    pub fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One claim on a table entry. The last claim to go removes the entry.
struct Lease {
    key: String,
    table: Arc<Mutex<LockTable>>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = table.get_mut(&self.key) {
            entry.users = entry.users.saturating_sub(1);
            if entry.users == 0 {
                table.remove(&self.key);
            }
        }
    }
}

/// Releases the conversation on drop.
pub struct TurnGuard {
    // Fields drop in order: the mutex is released before the claim goes.
    _guard: OwnedMutexGuard<()>,
    _lease: Lease,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_conversation_is_serialized() {
        let locks = TurnLocks::new();
        let id = ConversationId::from("c-1");

        let first = locks.acquire(&id).await;
        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _second = locks.acquire(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn different_conversations_do_not_block() {
        let locks = TurnLocks::new();
        let _a = locks.acquire(&ConversationId::from("a")).await;
        let _b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&ConversationId::from("b")),
        )
        .await
        .expect("second conversation should not wait");
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn abandoned_waiter_leaves_no_entry_behind() {
        let locks = TurnLocks::new();
        let id = ConversationId::from("c-1");

        let first = locks.acquire(&id).await;
        let gave_up = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&id)).await;
        assert!(gave_up.is_err());
        assert_eq!(locks.len(), 1);

        drop(first);
        assert!(locks.is_empty());

        // The conversation is still usable afterwards
        let again = tokio::time::timeout(Duration::from_millis(100), locks.acquire(&id))
            .await
            .expect("lock should be free");
        drop(again);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn waiter_dropped_after_release_leaves_no_entry_behind() {
        let locks = TurnLocks::new();
        let id = ConversationId::from("c-1");

        let first = locks.acquire(&id).await;
        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _second = locks.acquire(&id).await;
                std::future::pending::<()>().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter is handed the lock, then cancelled
        drop(first);
        tokio::time::sleep(Duration::from_millis(20)).await;
        waiter.abort();
        let _ = waiter.await;
        assert!(locks.is_empty());
    }
}
