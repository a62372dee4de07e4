//! In-memory request-support caches.
//!
//! All three caches are eventually consistent with the backend: a stale or
//! missing entry only costs an extra probe, never wrong content. Keys are
//! percent-decoded display paths except for the size cache, which is keyed
//! by the *encrypted* (stored) path.

use dashmap::DashMap;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum size worth caching. Backends answer errors with small bodies;
/// caching those would poison later IV derivations.
pub const MIN_CACHEABLE_SIZE: u64 = 1024;

/// Cached metadata for one directory entry, populated from listings,
/// `fs/get` responses and PROPFIND multistatus bodies.
#[derive(Clone, Debug, Default)]
pub struct FileInfo {
    pub path: String,
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

impl FileInfo {
    /// Build from an Alist JSON object (`name`, `size`, `is_dir` fields).
    pub fn from_json(path: &str, value: &Value) -> Self {
        Self {
            path: path.to_string(),
            name: value["name"].as_str().unwrap_or_default().to_string(),
            size: value["size"].as_u64().unwrap_or(0),
            is_dir: value["is_dir"].as_bool().unwrap_or(false),
        }
    }
}

/// TTL cache of `FileInfo` keyed by display path.
pub struct FileInfoCache {
    entries: DashMap<String, (FileInfo, Instant)>,
    ttl: Duration,
}

impl FileInfoCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, path: &str) -> Option<FileInfo> {
        let entry = self.entries.get(path)?;
        let (info, stored_at) = entry.value();
        if stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(info.clone())
    }

    pub fn insert(&self, info: FileInfo) {
        self.entries
            .insert(info.path.clone(), (info, Instant::now()));
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, stored_at)| stored_at.elapsed() <= self.ttl);
        before - self.entries.len()
    }
}

impl Default for FileInfoCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

/// TTL + FIFO-capped cache of file sizes keyed by encrypted path.
pub struct FileSizeCache {
    entries: DashMap<String, (u64, Instant)>,
    order: Mutex<VecDeque<String>>,
    ttl: Duration,
    max_entries: usize,
}

impl FileSizeCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            ttl,
            max_entries,
        }
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        let entry = self.entries.get(path)?;
        let (size, stored_at) = *entry.value();
        if stored_at.elapsed() > self.ttl || size < MIN_CACHEABLE_SIZE {
            return None;
        }
        Some(size)
    }

    /// Cache a size. Sizes below [`MIN_CACHEABLE_SIZE`] are ignored.
    pub fn insert(&self, path: &str, size: u64) {
        if size < MIN_CACHEABLE_SIZE {
            return;
        }
        let fresh = self
            .entries
            .insert(path.to_string(), (size, Instant::now()))
            .is_none();
        if !fresh {
            return;
        }

        let mut order = self.order.lock().expect("size cache order poisoned");
        order.push_back(path.to_string());
        while order.len() > self.max_entries {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, stored_at)| stored_at.elapsed() <= self.ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            let mut order = self.order.lock().expect("size cache order poisoned");
            order.retain(|path| self.entries.contains_key(path));
        }
        removed
    }
}

impl Default for FileSizeCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600), 10_000)
    }
}

/// Display→real path map populated by the most recent PROPFIND, consulted
/// before falling back to re-encrypting a basename.
pub struct NameMap {
    entries: DashMap<String, (String, Instant)>,
    ttl: Duration,
}

impl NameMap {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn get(&self, display_path: &str) -> Option<String> {
        let entry = self.entries.get(display_path)?;
        let (real, stored_at) = entry.value();
        if stored_at.elapsed() > self.ttl {
            return None;
        }
        Some(real.clone())
    }

    pub fn insert(&self, display_path: &str, real_path: &str) {
        self.entries.insert(
            display_path.to_string(),
            (real_path.to_string(), Instant::now()),
        );
    }

    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, (_, stored_at)| stored_at.elapsed() <= self.ttl);
        before - self.entries.len()
    }
}

impl Default for NameMap {
    fn default() -> Self {
        Self::new(Duration::from_secs(600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_info_roundtrip_and_expiry() {
        let cache = FileInfoCache::new(Duration::from_millis(10));
        cache.insert(FileInfo {
            path: "/a/b".into(),
            name: "b".into(),
            size: 5,
            is_dir: false,
        });
        assert_eq!(cache.get("/a/b").unwrap().size, 5);

        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("/a/b").is_none());
        assert_eq!(cache.sweep(), 1);
    }

    #[test]
    fn file_info_from_json() {
        let value: Value =
            serde_json::from_str(r#"{"name": "x.mp4", "size": 2048, "is_dir": false}"#).unwrap();
        let info = FileInfo::from_json("/dir/x.mp4", &value);
        assert_eq!(info.name, "x.mp4");
        assert_eq!(info.size, 2048);
        assert!(!info.is_dir);
    }

    #[test]
    fn size_cache_rejects_tiny_entries() {
        let cache = FileSizeCache::default();
        cache.insert("/enc/a", 100);
        assert!(cache.get("/enc/a").is_none());

        cache.insert("/enc/a", 4096);
        assert_eq!(cache.get("/enc/a"), Some(4096));
    }

    #[test]
    fn size_cache_evicts_in_insertion_order() {
        let cache = FileSizeCache::new(Duration::from_secs(60), 3);
        for i in 0..5u64 {
            cache.insert(&format!("/enc/{i}"), 2048 + i);
        }
        assert!(cache.get("/enc/0").is_none());
        assert!(cache.get("/enc/1").is_none());
        assert_eq!(cache.get("/enc/2"), Some(2050));
        assert_eq!(cache.get("/enc/4"), Some(2052));
    }

    #[test]
    fn size_cache_update_does_not_duplicate_order() {
        let cache = FileSizeCache::new(Duration::from_secs(60), 2);
        cache.insert("/enc/a", 2048);
        cache.insert("/enc/a", 4096);
        cache.insert("/enc/b", 2048);
        assert_eq!(cache.get("/enc/a"), Some(4096));
        assert_eq!(cache.get("/enc/b"), Some(2048));
    }

    #[test]
    fn name_map_round_trip() {
        let map = NameMap::default();
        map.insert("/dav/s/holiday.mp4", "/dav/s/XJ7mA.mp4");
        assert_eq!(
            map.get("/dav/s/holiday.mp4").as_deref(),
            Some("/dav/s/XJ7mA.mp4")
        );
        assert!(map.get("/dav/s/other").is_none());
    }
}
