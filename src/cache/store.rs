//! Identity-addressed cache directory.

use std::path::{Path, PathBuf};

use crate::util::Result;
use super::{read_cache, write_cache, VertexCache};

/// Cache identity: a sample and optionally one of its garments.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub sample: String,
    pub garment: Option<String>,
}

impl CacheKey {
    /// Key for the body of a sample.
    pub fn body(sample: impl Into<String>) -> Self {
        Self { sample: sample.into(), garment: None }
    }

    /// Key for one garment of a sample.
    pub fn garment(sample: impl Into<String>, garment: impl Into<String>) -> Self {
        Self { sample: sample.into(), garment: Some(garment.into()) }
    }

    /// Cache file name (`<sample>.pc2` or `<sample>_<garment>.pc2`).
    pub fn file_name(&self) -> String {
        match &self.garment {
            Some(g) => format!("{}_{}.pc2", self.sample, g),
            None => format!("{}.pc2", self.sample),
        }
    }
}

/// A directory of write-once point caches.
#[derive(Clone, Debug)]
pub struct VertexCacheStore {
    root: PathBuf,
}

impl VertexCacheStore {
    /// Store rooted at `root` (created lazily on first write).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store root directory.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic path for a key.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.file_name())
    }

    /// Whether a cache exists for the key.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Load the cache for a key if one exists.
    ///
    /// An existing file is trusted as-is; a file that exists but cannot be
    /// decoded is an error rather than a miss.
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<VertexCache>> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        tracing::info!("reusing cache {}", path.display());
        read_cache(&path).map(Some)
    }

    /// Persist a cache unless one already exists for the key.
    ///
    /// Returns `true` when a file was written.
    pub fn persist(&self, key: &CacheKey, cache: &VertexCache) -> Result<bool> {
        let path = self.path_for(key);
        if path.exists() {
            tracing::debug!("cache {} already present, not overwriting", path.display());
            return Ok(false);
        }
        tracing::info!(frames = cache.frame_count(), "writing cache {}", path.display());
        write_cache(&path, cache)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::Vec3;

    fn cache(value: f32) -> VertexCache {
        VertexCache::from_frames(&[vec![Vec3::splat(value); 4]]).unwrap()
    }

    #[test]
    fn test_key_file_names() {
        assert_eq!(CacheKey::body("00012").file_name(), "00012.pc2");
        assert_eq!(CacheKey::garment("00012", "Tshirt").file_name(), "00012_Tshirt.pc2");
    }

    #[test]
    fn test_lookup_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let store = VertexCacheStore::new(dir.path().join("view_cache"));
        let key = CacheKey::body("00001");

        assert!(store.lookup(&key).unwrap().is_none());
        assert!(store.persist(&key, &cache(1.0)).unwrap());
        assert!(store.contains(&key));
        assert_eq!(store.lookup(&key).unwrap(), Some(cache(1.0)));
    }

    #[test]
    fn test_persist_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = VertexCacheStore::new(dir.path());
        let key = CacheKey::garment("00001", "Skirt");

        assert!(store.persist(&key, &cache(1.0)).unwrap());
        let before = std::fs::read(store.path_for(&key)).unwrap();

        assert!(!store.persist(&key, &cache(2.0)).unwrap());
        let after = std::fs::read(store.path_for(&key)).unwrap();
        assert_eq!(before, after);
        assert_eq!(store.lookup(&key).unwrap(), Some(cache(1.0)));
    }

    #[test]
    fn test_corrupt_cache_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = VertexCacheStore::new(dir.path());
        let key = CacheKey::body("bad");
        std::fs::write(store.path_for(&key), b"not a cache at all, definitely not").unwrap();
        assert!(store.lookup(&key).is_err());
    }
}
