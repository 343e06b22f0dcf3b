//! Content-addressed image bytes with a decoded-image cache in front.
//!
//! Freshly imported images live in memory as "pending uploads" until a save
//! flushes them to the backing store, so importing never waits on I/O.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use strata_core::ImageId;

use crate::backend::PersistentStore;
use crate::error::{StoreError, StoreResult};

/// Default decoded-cache budget.
pub const DEFAULT_CACHE_BYTES: usize = 256 * 1024 * 1024;

/// Pixels ready for painting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA pixel data (4 bytes per pixel).
    pub rgba: Arc<[u8]>,
}

impl DecodedImage {
    /// Decode PNG/JPEG/WebP/... bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the bytes are not a supported image.
    pub fn decode(id: &ImageId, bytes: &[u8]) -> StoreResult<Self> {
        let img = image::load_from_memory(bytes).map_err(|e| StoreError::Decode {
            id: id.clone(),
            reason: e.to_string(),
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            rgba: rgba.into_raw().into(),
        })
    }

    /// A transparent image of the given size.
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        let len = (width as usize) * (height as usize) * 4;
        Self {
            width,
            height,
            rgba: vec![0; len].into(),
        }
    }

    /// Size of the pixel buffer in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.rgba.len()
    }
}

/// Decode off the async executor.
async fn decode_blocking(id: ImageId, bytes: Arc<[u8]>) -> StoreResult<DecodedImage> {
    tokio::task::spawn_blocking(move || DecodedImage::decode(&id, &bytes))
        .await
        .map_err(|e| StoreError::Session(format!("decode task failed: {e}")))?
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of evictions.
    pub evictions: u64,
    /// Entries currently cached.
    pub entries: usize,
    /// Bytes currently cached.
    pub bytes: usize,
}

#[derive(Debug)]
struct CacheEntry {
    image: DecodedImage,
    last_accessed: Instant,
}

/// Least-recently-used decoded images, bounded by total pixel bytes.
#[derive(Debug)]
struct DecodedCache {
    entries: HashMap<ImageId, CacheEntry>,
    max_bytes: usize,
    current_bytes: usize,
    stats: CacheStats,
}

impl DecodedCache {
    fn new(max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_bytes,
            current_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    fn get(&mut self, id: &ImageId) -> Option<DecodedImage> {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_accessed = Instant::now();
            self.stats.hits += 1;
            Some(entry.image.clone())
        } else {
            self.stats.misses += 1;
            None
        }
    }

    fn insert(&mut self, id: ImageId, image: DecodedImage) {
        self.remove(&id);
        let size = image.size_bytes();
        while self.current_bytes + size > self.max_bytes && self.evict_oldest() {}
        self.current_bytes += size;
        self.entries.insert(
            id,
            CacheEntry {
                image,
                last_accessed: Instant::now(),
            },
        );
    }

    fn remove(&mut self, id: &ImageId) -> bool {
        if let Some(old) = self.entries.remove(id) {
            self.current_bytes -= old.image.size_bytes();
            true
        } else {
            false
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                self.remove(&id);
                self.stats.evictions += 1;
                tracing::trace!(image = %id, "Evicted decoded image");
                true
            }
            None => false,
        }
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            bytes: self.current_bytes,
            ..self.stats
        }
    }
}

/// Images by content id: a persistent store, pending uploads and a decoded cache.
#[derive(Debug)]
pub struct ImageStore {
    store: Arc<dyn PersistentStore>,
    cache: Mutex<DecodedCache>,
    pending: Mutex<HashMap<ImageId, Arc<[u8]>>>,
}

impl ImageStore {
    /// Wrap a store with the default cache budget.
    #[must_use]
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self::with_cache_bytes(store, DEFAULT_CACHE_BYTES)
    }

    /// Wrap a store with a custom cache budget.
    #[must_use]
    pub fn with_cache_bytes(store: Arc<dyn PersistentStore>, max_bytes: usize) -> Self {
        Self {
            store,
            cache: Mutex::new(DecodedCache::new(max_bytes)),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PersistentStore> {
        &self.store
    }

    fn cache(&self) -> std::sync::MutexGuard<'_, DecodedCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<ImageId, Arc<[u8]>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decode new image bytes, cache them and queue them for upload.
    ///
    /// Importing the same bytes twice yields the same id and one upload.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the bytes are not an image.
    pub async fn import(&self, bytes: Vec<u8>) -> StoreResult<(ImageId, DecodedImage)> {
        let id = ImageId::for_content(&bytes);
        if let Some(image) = self.cache().get(&id) {
            return Ok((id, image));
        }

        let bytes: Arc<[u8]> = bytes.into();
        let image = decode_blocking(id.clone(), Arc::clone(&bytes)).await?;
        self.cache().insert(id.clone(), image.clone());
        self.pending().insert(id.clone(), bytes);
        tracing::info!(image = %id, width = image.width, height = image.height, "Imported image");
        Ok((id, image))
    }

    /// Store encoded bytes under `id` right away.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    pub async fn save_image(&self, id: &ImageId, bytes: &[u8]) -> StoreResult<()> {
        self.store.save_image_bytes(id, bytes).await?;
        self.pending().remove(id);
        Ok(())
    }

    /// Encoded bytes for `id`, pending uploads first.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    pub async fn get_image(&self, id: &ImageId) -> StoreResult<Option<Vec<u8>>> {
        let pending = self.pending().get(id).cloned();
        if let Some(bytes) = pending {
            return Ok(Some(bytes.to_vec()));
        }
        self.store.get_image_bytes(id).await
    }

    /// Delete `id` from the store, the cache and the upload queue.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures; the cache entry is dropped regardless.
    pub async fn remove_image(&self, id: &ImageId) -> StoreResult<()> {
        self.cache().remove(id);
        self.pending().remove(id);
        self.store.remove_image_bytes(id).await
    }

    /// Every id persisted in the backing store.
    ///
    /// # Errors
    ///
    /// Propagates backing-store failures.
    pub async fn all_image_ids(&self) -> StoreResult<Vec<ImageId>> {
        self.store.list_image_ids().await
    }

    /// Decoded pixels for `id`: cache, then pending bytes, then the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ImageNotFound`] if no bytes exist anywhere, or
    /// [`StoreError::Decode`] if they are corrupt.
    pub async fn decoded(&self, id: &ImageId) -> StoreResult<DecodedImage> {
        if let Some(image) = self.cache().get(id) {
            return Ok(image);
        }
        let pending = self.pending().get(id).cloned();
        let bytes: Arc<[u8]> = match pending {
            Some(bytes) => bytes,
            None => self
                .store
                .get_image_bytes(id)
                .await?
                .ok_or_else(|| StoreError::ImageNotFound(id.clone()))?
                .into(),
        };
        let image = decode_blocking(id.clone(), bytes).await?;
        self.cache().insert(id.clone(), image.clone());
        Ok(image)
    }

    /// Upload every pending image among `ids`. Returns how many were written.
    ///
    /// Images that fail stay queued for the next flush.
    ///
    /// # Errors
    ///
    /// Returns the first backing-store failure after attempting every image.
    pub async fn flush_pending(&self, ids: &[ImageId]) -> StoreResult<usize> {
        let queued: Vec<(ImageId, Arc<[u8]>)> = {
            let pending = self.pending();
            ids.iter()
                .filter_map(|id| pending.get(id).map(|b| (id.clone(), Arc::clone(b))))
                .collect()
        };

        let mut written = 0;
        let mut first_error = None;
        for (id, bytes) in queued {
            match self.store.save_image_bytes(&id, &bytes).await {
                Ok(()) => {
                    self.pending().remove(&id);
                    written += 1;
                }
                Err(e) => {
                    tracing::warn!(image = %id, error = %e, "Image upload failed, will retry");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }

    /// Ids imported but not yet uploaded.
    #[must_use]
    pub fn pending_ids(&self) -> Vec<ImageId> {
        let mut ids: Vec<ImageId> = self.pending().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Decoded-cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }
}
