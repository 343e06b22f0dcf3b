//! Persistent key/value storage for editor state and image bytes.
//!
//! Every operation is asynchronous and idempotent on retry: writing the same
//! value twice leaves one copy, removing a missing key succeeds.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use strata_core::{CanvasDocument, ImageId};

use crate::error::StoreResult;

const STATES_DIR: &str = "states";
const IMAGES_DIR: &str = "images";
const IMAGE_EXT: &str = "bin";
const STATE_EXT: &str = "json";
const UNUSED_LEDGER_FILE: &str = "unused-images.json";

/// When each stored image was first seen unreferenced by any instance.
pub type UnusedLedger = BTreeMap<ImageId, u64>;

/// Durable storage consumed by sessions and the image store.
#[async_trait]
pub trait PersistentStore: Send + Sync + std::fmt::Debug {
    /// Fetch the persisted state stored under `key`.
    async fn get_state(&self, key: &str) -> StoreResult<Option<CanvasDocument>>;

    /// Store `state` under `key`, replacing any previous value.
    async fn set_state(&self, key: &str, state: &CanvasDocument) -> StoreResult<()>;

    /// Forget the state stored under `key`.
    async fn remove_state(&self, key: &str) -> StoreResult<()>;

    /// Store encoded image bytes.
    async fn save_image_bytes(&self, id: &ImageId, data: &[u8]) -> StoreResult<()>;

    /// Fetch encoded image bytes.
    async fn get_image_bytes(&self, id: &ImageId) -> StoreResult<Option<Vec<u8>>>;

    /// Delete encoded image bytes.
    async fn remove_image_bytes(&self, id: &ImageId) -> StoreResult<()>;

    /// Every stored image id.
    async fn list_image_ids(&self) -> StoreResult<Vec<ImageId>>;

    /// Keys of every persisted state. A key read back here always resolves
    /// through [`Self::get_state`].
    async fn list_state_keys(&self) -> StoreResult<Vec<String>>;

    /// First-unused observations shared by every instance on this store.
    async fn get_unused_ledger(&self) -> StoreResult<UnusedLedger>;

    /// Replace the first-unused observations.
    async fn set_unused_ledger(&self, ledger: &UnusedLedger) -> StoreResult<()>;
}

// -----------------------------------------------------------------------
// In-memory backend
// -----------------------------------------------------------------------

/// Volatile store for tests and the browser-less CLI dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    states: RwLock<HashMap<String, CanvasDocument>>,
    images: RwLock<HashMap<ImageId, Vec<u8>>>,
    unused: RwLock<UnusedLedger>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get_state(&self, key: &str) -> StoreResult<Option<CanvasDocument>> {
        Ok(self.states.read().await.get(key).cloned())
    }

    async fn set_state(&self, key: &str, state: &CanvasDocument) -> StoreResult<()> {
        self.states
            .write()
            .await
            .insert(key.to_string(), state.clone());
        Ok(())
    }

    async fn remove_state(&self, key: &str) -> StoreResult<()> {
        self.states.write().await.remove(key);
        Ok(())
    }

    async fn save_image_bytes(&self, id: &ImageId, data: &[u8]) -> StoreResult<()> {
        self.images.write().await.insert(id.clone(), data.to_vec());
        Ok(())
    }

    async fn get_image_bytes(&self, id: &ImageId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.images.read().await.get(id).cloned())
    }

    async fn remove_image_bytes(&self, id: &ImageId) -> StoreResult<()> {
        self.images.write().await.remove(id);
        Ok(())
    }

    async fn list_image_ids(&self) -> StoreResult<Vec<ImageId>> {
        let mut ids: Vec<ImageId> = self.images.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_state_keys(&self) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.states.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_unused_ledger(&self) -> StoreResult<UnusedLedger> {
        Ok(self.unused.read().await.clone())
    }

    async fn set_unused_ledger(&self, ledger: &UnusedLedger) -> StoreResult<()> {
        *self.unused.write().await = ledger.clone();
        Ok(())
    }
}

// -----------------------------------------------------------------------
// Filesystem backend
// -----------------------------------------------------------------------

/// Store laid out as `<root>/states/<key>.json` and `<root>/images/<id>.bin`,
/// plus `<root>/unused-images.json` for the collector's observations.
///
/// Keys and ids are sanitised to filename-safe characters. Content-addressed
/// image ids already are, so listing returns them unchanged.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Io`] if the directories cannot be created.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(root.join(STATES_DIR)).await?;
        tokio::fs::create_dir_all(root.join(IMAGES_DIR)).await?;
        tracing::debug!(root = %root.display(), "Opened filesystem store");
        Ok(Self { root })
    }

    /// Directory holding the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.root
            .join(STATES_DIR)
            .join(format!("{}.{STATE_EXT}", sanitize_filename(key)))
    }

    fn image_path(&self, id: &ImageId) -> PathBuf {
        self.root
            .join(IMAGES_DIR)
            .join(format!("{}.{IMAGE_EXT}", sanitize_filename(id.as_str())))
    }
}

/// Write via a sibling temp file so readers never see a torn file.
async fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_optional(path: &Path) -> StoreResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_optional(path: &Path) -> StoreResult<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[async_trait]
impl PersistentStore for FsStore {
    async fn get_state(&self, key: &str) -> StoreResult<Option<CanvasDocument>> {
        let Some(bytes) = read_optional(&self.state_path(key)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn set_state(&self, key: &str, state: &CanvasDocument) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(state)?;
        write_atomic(&self.state_path(key), &json).await
    }

    async fn remove_state(&self, key: &str) -> StoreResult<()> {
        remove_optional(&self.state_path(key)).await
    }

    async fn save_image_bytes(&self, id: &ImageId, data: &[u8]) -> StoreResult<()> {
        write_atomic(&self.image_path(id), data).await
    }

    async fn get_image_bytes(&self, id: &ImageId) -> StoreResult<Option<Vec<u8>>> {
        read_optional(&self.image_path(id)).await
    }

    async fn remove_image_bytes(&self, id: &ImageId) -> StoreResult<()> {
        remove_optional(&self.image_path(id)).await
    }

    async fn list_image_ids(&self) -> StoreResult<Vec<ImageId>> {
        let mut entries = tokio::fs::read_dir(self.root.join(IMAGES_DIR)).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(ImageId::new(stem));
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn list_state_keys(&self) -> StoreResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.root.join(STATES_DIR)).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(STATE_EXT) {
                continue;
            }
            // Sanitised stems map back to the same file.
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn get_unused_ledger(&self) -> StoreResult<UnusedLedger> {
        match read_optional(&self.root.join(UNUSED_LEDGER_FILE)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(UnusedLedger::new()),
        }
    }

    async fn set_unused_ledger(&self, ledger: &UnusedLedger) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(ledger)?;
        write_atomic(&self.root.join(UNUSED_LEDGER_FILE), &json).await
    }
}

/// Sanitize a key for use as a filename.
///
/// Replaces any character that is not alphanumeric, `-`, or `_` with `_`.
fn sanitize_filename(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> CanvasDocument {
        CanvasDocument::from_json(r#"{"layers":[],"width":512.0,"height":256.0}"#)
            .expect("valid document")
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("node-12"), "node-12");
        assert_eq!(sanitize_filename("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_filename("a b.c"), "a_b_c");
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get_state("k").await.expect("get").is_none());

        store.set_state("k", &document()).await.expect("set");
        let back = store.get_state("k").await.expect("get").expect("present");
        assert!((back.width - 512.0).abs() < f64::EPSILON);

        store.remove_state("k").await.expect("remove");
        store.remove_state("k").await.expect("remove twice");
        assert!(store.get_state("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_memory_store_images_sorted() {
        let store = MemoryStore::new();
        store
            .save_image_bytes(&ImageId::from("b"), b"2")
            .await
            .expect("save");
        store
            .save_image_bytes(&ImageId::from("a"), b"1")
            .await
            .expect("save");
        let ids = store.list_image_ids().await.expect("list");
        assert_eq!(ids, vec![ImageId::from("a"), ImageId::from("b")]);
    }

    #[tokio::test]
    async fn test_fs_store_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::open(dir.path()).await.expect("open");

        store.set_state("node/1", &document()).await.expect("set");
        assert!(dir.path().join("states/node_1.json").exists());
        let back = store.get_state("node/1").await.expect("get");
        assert!(back.is_some());

        let id = ImageId::for_content(b"pixels");
        store.save_image_bytes(&id, b"pixels").await.expect("save");
        store.save_image_bytes(&id, b"pixels").await.expect("save again");
        assert_eq!(store.list_image_ids().await.expect("list"), vec![id.clone()]);
        assert_eq!(
            store.get_image_bytes(&id).await.expect("get").as_deref(),
            Some(&b"pixels"[..])
        );

        store.remove_image_bytes(&id).await.expect("remove");
        store.remove_image_bytes(&id).await.expect("remove missing");
        assert!(store.get_image_bytes(&id).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_memory_store_lists_state_keys() {
        let store = MemoryStore::new();
        store.set_state("b", &document()).await.expect("set");
        store.set_state("a", &document()).await.expect("set");
        assert_eq!(store.list_state_keys().await.expect("list"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fs_store_state_keys_and_ledger() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::open(dir.path()).await.expect("open");
        store.set_state("node/1", &document()).await.expect("set");
        store.set_state("node-2", &document()).await.expect("set");

        let keys = store.list_state_keys().await.expect("list");
        assert_eq!(keys, vec!["node-2", "node_1"]);
        for key in &keys {
            assert!(store.get_state(key).await.expect("get").is_some());
        }

        assert!(store.get_unused_ledger().await.expect("empty").is_empty());
        let mut ledger = UnusedLedger::new();
        ledger.insert(ImageId::from("orphan"), 1_234);
        store.set_unused_ledger(&ledger).await.expect("set ledger");

        let reopened = FsStore::open(dir.path()).await.expect("reopen");
        assert_eq!(reopened.get_unused_ledger().await.expect("ledger"), ledger);
    }

    #[tokio::test]
    async fn test_fs_store_rejects_corrupt_state() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsStore::open(dir.path()).await.expect("open");
        tokio::fs::write(dir.path().join("states/bad.json"), b"{ nope")
            .await
            .expect("write");
        assert!(matches!(
            store.get_state("bad").await,
            Err(crate::StoreError::Serialization(_))
        ));
    }
}
