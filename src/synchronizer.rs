//! # Store Synchronizer
//!
//! Merges freshly extracted links into the shared collection.
//!
//! The merge is a plain read-modify-write: read the collection, keep the
//! candidates whose `href` is not stored yet, append them and write the whole
//! collection back with one `set`. Two writers that both read before either
//! writes will lose one side's additions; the next extraction pass in the
//! affected frame sees the same anchors again and re-adds them.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::links::{LinkCollection, LinkRecord};
use crate::store::{KeyValueStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    /// Records appended by this merge.
    pub added: usize,
    /// Collection size as written (or as read, when nothing was added).
    pub total: usize,
}

#[derive(Clone)]
pub struct StoreSynchronizer {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl StoreSynchronizer {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> Result<LinkCollection, StoreError> {
        Ok(LinkCollection::from_value(self.store.get(&self.key)?)?)
    }

    /// Append candidates whose `href` is neither stored nor repeated earlier
    /// in the same batch. Writes only when something was added.
    pub fn merge<I>(&self, candidates: I) -> Result<MergeOutcome, StoreError>
    where
        I: IntoIterator<Item = LinkRecord>,
    {
        let mut collection = self.load()?;
        let fresh: Vec<LinkRecord> = {
            let mut seen: HashSet<String> = collection
                .records()
                .iter()
                .map(|r| r.href.clone())
                .collect();
            candidates
                .into_iter()
                .filter(|candidate| seen.insert(candidate.href.clone()))
                .collect()
        };

        if fresh.is_empty() {
            return Ok(MergeOutcome {
                added: 0,
                total: collection.len(),
            });
        }

        let added = fresh.len();
        collection.extend(fresh);
        self.store.set(&self.key, collection.to_value()?)?;
        debug!("merged links key={} added={} total={}", self.key, added, collection.len());
        Ok(MergeOutcome {
            added,
            total: collection.len(),
        })
    }

    /// Replace the collection with an empty one, unconditionally.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.set(&self.key, LinkCollection::new().to_value()?)
    }
}
