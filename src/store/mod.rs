//! # Store Service
//!
//! The persisted key-value store shared by every frame and panel surface.
//! Callers only see `get`, `set` and a change subscription; each write is
//! atomic on its own, but nothing spans a read and a later write.

pub mod file;
pub mod memory;

use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serde_json::Value;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Notification delivered for every write, including writes from other
/// frames sharing the same store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreChange {
    pub key: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// Persistent key-value store.
///
/// # Example
/// ```rust
/// use linkharvest::store::{KeyValueStore, MemoryStore};
/// use serde_json::json;
///
/// let store = MemoryStore::new();
/// let changes = store.subscribe();
/// store.set("allCollectedLinks", json!([])).unwrap();
/// assert_eq!(store.get("allCollectedLinks").unwrap(), Some(json!([])));
/// assert_eq!(changes.recv().unwrap().key, "allCollectedLinks");
/// ```
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    fn subscribe(&self) -> Receiver<StoreChange>;
}

/// Fan-out list of change subscribers. Disconnected receivers are pruned on
/// the next notification.
#[derive(Default)]
pub struct Subscribers {
    senders: Mutex<Vec<Sender<StoreChange>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<StoreChange> {
        let (tx, rx) = unbounded();
        self.lock().push(tx);
        rx
    }

    pub fn notify(&self, change: StoreChange) {
        self.lock().retain(|tx| tx.send(change.clone()).is_ok());
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Sender<StoreChange>>> {
        self.senders
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
