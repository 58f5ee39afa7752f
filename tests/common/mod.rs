//! Shared test infrastructure for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use url::Url;

use crossbeam_channel::Receiver;
use linkharvest::config::{self, Config};
use linkharvest::dom::Document;
use linkharvest::dom::parse::parse_document;
use linkharvest::links::LinkCollection;
use linkharvest::store::{KeyValueStore, MemoryStore, StoreChange, StoreError};
use linkharvest::synchronizer::StoreSynchronizer;

// ============================================================================
// Fixtures
// ============================================================================

pub fn default_config() -> Config {
    config::load_config(None).expect("config").config
}

pub fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

pub fn synchronizer(store: &Arc<dyn KeyValueStore>) -> StoreSynchronizer {
    StoreSynchronizer::new(store.clone(), default_config().store_key)
}

pub fn top_document(url: &str, html: &str) -> Document {
    Document::top(Url::parse(url).expect("url"), parse_document(html))
}

pub fn frame_document(url: &str, frame_id: Option<&str>, html: &str) -> Document {
    Document::frame(Url::parse(url).expect("url"), frame_id, parse_document(html))
}

/// Top document with one iframe per `(id, content)` pair attached.
pub fn page_with_frames(url: &str, body: &str, frames: Vec<(&str, Document)>) -> Document {
    let doc = top_document(url, body);
    for (id, content) in frames {
        let iframe = doc.element_by_id(id).expect("iframe element");
        doc.attach_frame(iframe, content).expect("attach frame");
    }
    doc
}

pub fn stored(store: &Arc<dyn KeyValueStore>) -> LinkCollection {
    synchronizer(store).load().expect("load")
}

pub fn stored_hrefs(store: &Arc<dyn KeyValueStore>) -> Vec<String> {
    stored(store).records().iter().map(|r| r.href.clone()).collect()
}

/// Poll `condition` until it holds; panics after five seconds.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

// ============================================================================
// Store doubles
// ============================================================================

/// Store whose reads and writes can be switched off to simulate an
/// unavailable backend.
pub struct FlakyStore {
    inner: MemoryStore,
    available: std::sync::atomic::AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            available: std::sync::atomic::AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available
            .store(available, std::sync::atomic::Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(std::sync::atomic::Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("switched off".to_string()))
        }
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.check()?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.check()?;
        self.inner.set(key, value)
    }

    fn subscribe(&self) -> Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

/// Store that parks the next `readers` reads at a barrier after they have
/// read, so their read-modify-write cycles overlap and the later write
/// discards the earlier one.
pub struct InterleavingStore {
    inner: MemoryStore,
    pending: AtomicUsize,
    barrier: Mutex<Option<Arc<Barrier>>>,
}

impl InterleavingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            pending: AtomicUsize::new(0),
            barrier: Mutex::new(None),
        }
    }

    pub fn interleave_next_reads(&self, readers: usize) {
        *self.barrier.lock().expect("barrier") = Some(Arc::new(Barrier::new(readers)));
        self.pending.store(readers, Ordering::SeqCst);
    }
}

impl KeyValueStore for InterleavingStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let value = self.inner.get(key)?;
        let parked = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if parked {
            let barrier = self.barrier.lock().expect("barrier").clone();
            if let Some(barrier) = barrier {
                barrier.wait();
            }
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(key, value)
    }

    fn subscribe(&self) -> Receiver<StoreChange> {
        self.inner.subscribe()
    }
}

/// Store where another writer commits `follow_up` right after every write
/// of an empty collection, then runs the installed hook.
pub struct WriteAfterClearStore {
    inner: MemoryStore,
    follow_up: Value,
    after_clear: OnceLock<Box<dyn Fn() + Send + Sync>>,
}

impl WriteAfterClearStore {
    pub fn new(follow_up: Value) -> Self {
        Self {
            inner: MemoryStore::new(),
            follow_up,
            after_clear: OnceLock::new(),
        }
    }

    pub fn on_clear(&self, hook: impl Fn() + Send + Sync + 'static) {
        if self.after_clear.set(Box::new(hook)).is_err() {
            panic!("clear hook already installed");
        }
    }
}

impl KeyValueStore for WriteAfterClearStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let clearing = value.as_array().is_some_and(|items| items.is_empty());
        self.inner.set(key, value)?;
        if clearing {
            self.inner.set(key, self.follow_up.clone())?;
            if let Some(hook) = self.after_clear.get() {
                hook();
            }
        }
        Ok(())
    }

    fn subscribe(&self) -> Receiver<StoreChange> {
        self.inner.subscribe()
    }
}
