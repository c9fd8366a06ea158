use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use super::context::ConversationContext;

/// One session's context slot. The slot lock is held for a whole turn, so
/// turns for the same session run one at a time in arrival order.
pub type SessionSlot = Arc<Mutex<Option<ConversationContext>>>;

pub type SessionGuard = OwnedMutexGuard<Option<ConversationContext>>;

/// In-memory session contexts keyed by session id.
///
/// A slot leaves the map when its session is cleared by a finish or expired
/// externally. Turns already queued on a departed slot move to the live one.
pub struct SessionStore {
    slots: Mutex<HashMap<String, SessionSlot>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The slot for `key`, created empty on first use.
    async fn slot(&self, key: &str) -> SessionSlot {
        let mut slots = self.slots.lock().await;
        slots.entry(key.to_string()).or_default().clone()
    }

    async fn is_current(&self, key: &str, slot: &SessionSlot) -> bool {
        self.slots
            .lock()
            .await
            .get(key)
            .is_some_and(|live| Arc::ptr_eq(live, slot))
    }

    /// Lock the live slot for `key` for the length of one turn.
    pub async fn lock(&self, key: &str) -> (SessionSlot, SessionGuard) {
        // The departed slot stays locked until the next one is held, so
        // waiters keep their order across the hand-over.
        let mut departed: Option<SessionGuard> = None;
        loop {
            let slot = self.slot(key).await;
            let guard = slot.clone().lock_owned().await;
            drop(departed.take());
            if self.is_current(key, &slot).await {
                return (slot, guard);
            }
            departed = Some(guard);
        }
    }

    /// Take `slot` out of the map if it is still the live slot for `key`.
    /// The caller holds the slot's lock.
    pub async fn evict(&self, key: &str, slot: &SessionSlot) -> bool {
        let mut slots = self.slots.lock().await;
        if slots.get(key).is_some_and(|live| Arc::ptr_eq(live, slot)) {
            slots.remove(key);
            true
        } else {
            false
        }
    }

    /// A copy of the stored context, if any.
    pub async fn snapshot(&self, key: &str) -> Option<ConversationContext> {
        let slot = self.slots.lock().await.get(key).cloned()?;
        let guard = slot.lock().await;
        guard.clone()
    }

    /// Drop a session (e.g. on external expiry). A turn in flight for it
    /// completes first; its result is discarded.
    pub async fn remove(&self, key: &str) -> bool {
        let Some(slot) = self.slots.lock().await.get(key).cloned() else {
            return false;
        };
        let mut guard = slot.lock().await;
        *guard = None;
        self.evict(key, &slot).await
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}
