use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crossbeam_channel::Receiver;
use serde_json::{Map, Value};
use tracing::debug;

use super::{KeyValueStore, StoreChange, StoreError, Subscribers};

/// JSON object on disk, one entry per key. Writes replace the file through a
/// temporary sibling so readers never observe a half-written document.
/// Change notifications reach subscribers in this process only.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
    subscribers: Subscribers,
}

impl FileStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = Self {
            path: path.to_path_buf(),
            write_lock: Mutex::new(()),
            subscribers: Subscribers::new(),
        };
        // Surface a corrupt file at open time rather than on first merge.
        store.read_map()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<Map<String, Value>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        match serde_json::from_slice::<Value>(&bytes)? {
            Value::Object(map) => Ok(map),
            other => Err(StoreError::Unavailable(format!(
                "{} does not hold a JSON object (found {})",
                self.path.display(),
                json_kind(&other)
            ))),
        }
    }

    fn write_map(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, map)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read_map()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        // Notify under the lock so subscribers see writes in commit order.
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("file store lock poisoned".to_string()))?;
        let mut map = self.read_map()?;
        let old_value = map.insert(key.to_string(), value.clone());
        self.write_map(&map)?;
        debug!("store write key={key} path={}", self.path.display());
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
