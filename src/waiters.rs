use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Notify;

/// Per-key wake-up signals for blocked pops.
///
/// Each key maps to a [`Notify`], which holds at most one pending permit: a signal sent while
/// nobody waits is kept for the next waiter, further signals are coalesced. A signal only means
/// "something changed, look again", the woken side still has to pop from the store.
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    channels: HashMap<String, Arc<Notify>>,
}

impl WaiterRegistry {
    pub fn new() -> WaiterRegistry {
        WaiterRegistry::default()
    }

    /// Returns the signal for `key`, creating it if needed. The returned handle counts as a waiter
    /// until it is dropped.
    pub fn subscribe(&mut self, key: &str) -> Arc<Notify> {
        self.channels
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wakes at most one waiter on `key`. A no-op when the key was never subscribed to.
    pub fn signal(&mut self, key: &str) {
        if let Some(notify) = self.channels.get(key) {
            notify.notify_one();
        }
    }

    /// Drops the signal for `key`, unless a waiter still holds it.
    pub fn release(&mut self, key: &str) {
        if self.waiting(key) == 0 {
            self.channels.remove(key);
        }
    }

    /// Number of outstanding waiters on `key`.
    pub fn waiting(&self, key: &str) -> usize {
        self.channels
            .get(key)
            .map_or(0, |notify| Arc::strong_count(notify) - 1)
    }
}
