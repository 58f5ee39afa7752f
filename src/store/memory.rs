use std::collections::HashMap;
use std::sync::Mutex;

use crossbeam_channel::Receiver;
use serde_json::Value;

use super::{KeyValueStore, StoreChange, StoreError, Subscribers};

/// In-process store; every handle sharing it through an `Arc` sees the same
/// values and notifications.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let guard = self
            .values
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut guard = self
            .values
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))?;
        let old_value = guard.insert(key.to_string(), value.clone());
        self.subscribers.notify(StoreChange {
            key: key.to_string(),
            old_value,
            new_value: Some(value),
        });
        Ok(())
    }

    fn subscribe(&self) -> Receiver<StoreChange> {
        self.subscribers.subscribe()
    }
}
