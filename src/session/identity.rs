//! Caller identity resolution
//!
//! When the chat surface does not supply a user identity, a pseudo-random one is
//! generated once per device and persisted so later requests reuse it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rand::Rng;

use crate::{Error, Result};

/// Key under which the generated identity is persisted
pub const IDENTITY_KEY: &str = "chatvoice_user_id";

/// Characters of one base-36 draw
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of a single draw
const DRAW_LEN: usize = 11;

/// Durable key-value storage for the generated identity
pub trait IdentityStore: Send + Sync {
    /// Read a value
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be written
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Read a value, creating and persisting it with `make` if absent
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be read or written
    fn get_or_insert_with(&self, key: &str, make: &dyn Fn() -> String) -> Result<String> {
        if let Some(existing) = self.get(key)?.filter(|v| !v.is_empty()) {
            return Ok(existing);
        }
        let value = make();
        self.set(key, &value)?;
        Ok(value)
    }
}

/// Generate a device identity from two concatenated base-36 draws
#[must_use]
pub fn generate_identity() -> String {
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(DRAW_LEN * 2);
    for _ in 0..2 {
        id.extend((0..DRAW_LEN).map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())])));
    }
    id
}

/// Pick the identity to send with a session request
///
/// A non-blank explicit identity wins. Otherwise the persisted identity is used,
/// generated on first use. Store failures degrade to an unpersisted identity.
pub fn resolve_identity(store: &dyn IdentityStore, explicit: Option<&str>) -> String {
    if let Some(id) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return id.to_string();
    }

    match store.get_or_insert_with(IDENTITY_KEY, &generate_identity) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "identity store unavailable, using unpersisted identity");
            generate_identity()
        }
    }
}

/// Process-local identity store
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryIdentityStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|e| Error::Identity(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|e| Error::Identity(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_or_insert_with(&self, key: &str, make: &dyn Fn() -> String) -> Result<String> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| Error::Identity(e.to_string()))?;
        Ok(values
            .entry(key.to_string())
            .or_insert_with(make)
            .clone())
    }
}

/// Identity store persisted as a JSON object on disk
#[derive(Debug)]
pub struct FileIdentityStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileIdentityStore {
    /// Create a store backed by `path` (created on first write)
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Identity(format!("invalid identity file: {e}")))
    }

    fn write_all(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }
}

impl IdentityStore for FileIdentityStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().map_err(|e| Error::Identity(e.to_string()))?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().map_err(|e| Error::Identity(e.to_string()))?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn get_or_insert_with(&self, key: &str, make: &dyn Fn() -> String) -> Result<String> {
        let _guard = self.lock.lock().map_err(|e| Error::Identity(e.to_string()))?;
        let mut values = self.read_all()?;
        if let Some(existing) = values.get(key).filter(|v| !v.is_empty()) {
            return Ok(existing.clone());
        }
        let value = make();
        values.insert(key.to_string(), value.clone());
        self.write_all(&values)?;
        tracing::info!(path = %self.path.display(), "persisted new device identity");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store whose every operation fails
    struct BrokenStore;

    impl IdentityStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(Error::Identity("unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(Error::Identity("unavailable".to_string()))
        }
    }

    #[test]
    fn test_generated_identity_shape() {
        let id = generate_identity();
        assert_eq!(id.len(), DRAW_LEN * 2);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
        assert_ne!(id, generate_identity());
    }

    #[test]
    fn test_explicit_identity_wins() {
        let store = MemoryIdentityStore::new();
        assert_eq!(resolve_identity(&store, Some(" alice ")), "alice");
        assert!(store.get(IDENTITY_KEY).unwrap().is_none());
    }

    #[test]
    fn test_blank_identity_falls_back_to_generated() {
        let store = MemoryIdentityStore::new();
        let first = resolve_identity(&store, Some("  "));
        let second = resolve_identity(&store, None);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_identity_reused() {
        let store = MemoryIdentityStore::new();
        store.set(IDENTITY_KEY, "persisted").unwrap();
        assert_eq!(resolve_identity(&store, None), "persisted");
    }

    #[test]
    fn test_broken_store_still_yields_identity() {
        let id = resolve_identity(&BrokenStore, None);
        assert_eq!(id.len(), DRAW_LEN * 2);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("identity.json");

        let first = resolve_identity(&FileIdentityStore::new(&path), None);
        let second = resolve_identity(&FileIdentityStore::new(&path), None);

        assert_eq!(first, second);
        assert!(path.exists());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("identity.json");
        fs::write(&path, "not json").unwrap();

        let store = FileIdentityStore::new(&path);
        assert!(store.get(IDENTITY_KEY).is_err());
    }
}
