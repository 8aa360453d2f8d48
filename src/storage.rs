//! storage.rs — Key/value persistence seam and storage-key migration.
//!
//! The engine is indifferent to the physical store: anything that can get,
//! set, and remove a string under a key will do, and failures must be
//! non-fatal (worst case the reader sees one prompt too many). Two backends
//! are provided: an in-memory map and a JSON file.
//!
//! `PromptStorage` layers the key-selection contract on top: keys carry a
//! product prefix, and a newer key format additionally carries a publication
//! id suffix. Reads try the scoped key first, then the legacy one; once a
//! scoped value exists (or the migration flag is on), writes move to the
//! scoped key and clear the legacy one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::warn;

const KEY_PREFIX: &str = "prompt.orchestrator";

/// Storage key for the frequency-cap timestamp record.
pub const TIMESTAMPS_KEY: &str = "timestamps";

pub const ENV_SCOPED_STORAGE_KEYS: &str = "SCOPED_STORAGE_KEYS";

/// Minimal persistence primitive. Implementations swallow their own I/O
/// errors; `get` returning `None` covers both absence and a broken backend.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Session-scoped store: values live for the process lifetime only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().expect("store mutex poisoned").get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.inner
            .lock()
            .expect("store mutex poisoned")
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.inner.lock().expect("store mutex poisoned").remove(key);
    }
}

/// Cross-session store backed by a single JSON object file.
/// Read and write failures are logged and swallowed.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_map(&self) -> HashMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write_map(&self, map: &HashMap<String, String>) {
        if let Some(dir) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                warn!("storage dir: {e:#}");
            }
        }
        let json = serde_json::to_vec_pretty(map).unwrap_or_default();
        if let Err(e) = std::fs::write(&self.path, json) {
            warn!("write storage: {e:#}");
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_map().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map);
    }

    fn remove(&self, key: &str) {
        let mut map = self.read_map();
        if map.remove(key).is_some() {
            self.write_map(&map);
        }
    }
}

/// Key-selection wrapper over a [`KeyValueStore`].
///
/// The legacy key format is `prefix:base`; the scoped format appends the
/// publication id. Without a publication id both formats collapse into the
/// legacy one and the wrapper is a plain pass-through.
pub struct PromptStorage {
    store: Arc<dyn KeyValueStore>,
    publication_id: Option<String>,
    prefer_scoped_keys: bool,
}

impl PromptStorage {
    pub fn new(store: Arc<dyn KeyValueStore>, publication_id: Option<String>) -> Self {
        let prefer_scoped_keys = std::env::var(ENV_SCOPED_STORAGE_KEYS)
            .ok()
            .is_some_and(|v| v == "1");
        Self {
            store,
            publication_id,
            prefer_scoped_keys,
        }
    }

    pub fn with_scoped_keys(mut self, prefer: bool) -> Self {
        self.prefer_scoped_keys = prefer;
        self
    }

    fn legacy_key(&self, base: &str) -> String {
        format!("{KEY_PREFIX}:{base}")
    }

    fn scoped_key(&self, base: &str) -> String {
        match &self.publication_id {
            Some(id) => format!("{KEY_PREFIX}:{base}:{id}"),
            None => self.legacy_key(base),
        }
    }

    pub fn get(&self, base: &str) -> Option<String> {
        self.store
            .get(&self.scoped_key(base))
            .or_else(|| self.store.get(&self.legacy_key(base)))
    }

    pub fn set(&self, base: &str, value: &str) {
        let scoped = self.scoped_key(base);
        let legacy = self.legacy_key(base);
        if scoped == legacy {
            self.store.set(&legacy, value);
            return;
        }
        // Once a scoped value exists the migration is committed for this key,
        // regardless of the flag in the current session.
        if self.prefer_scoped_keys || self.store.get(&scoped).is_some() {
            self.store.remove(&legacy);
            self.store.set(&scoped, value);
        } else {
            self.store.set(&legacy, value);
        }
    }

    pub fn remove(&self, base: &str) {
        let scoped = self.scoped_key(base);
        let legacy = self.legacy_key(base);
        if scoped != legacy && (self.prefer_scoped_keys || self.store.get(&scoped).is_some()) {
            self.store.remove(&scoped);
            return;
        }
        self.store.remove(&legacy);
    }
}
