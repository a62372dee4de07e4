//! Redirect registry.
//!
//! A backend 302 whose `Location` points at direct storage would bypass
//! decryption if the client followed it. Instead the URL is parked here
//! under a keyed token and the client is sent to `/redirect/<key>`, which
//! re-enters the decrypting download path with the stored cipher
//! parameters.

use md5::{Digest, Md5};
use shroud_core::EncType;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Entries expire one hour after registration.
const ENTRY_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on live entries; oldest registrations are evicted first.
const MAX_ENTRIES: usize = 10_000;

/// One parked upstream URL with the cipher parameters needed to serve it.
#[derive(Clone, Debug)]
pub struct RedirectEntry {
    pub url: String,
    pub total_size: u64,
    pub password: String,
    pub enc_type: EncType,
    expires_at: Instant,
}

impl RedirectEntry {
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Keyed store of parked redirect URLs.
#[derive(Default)]
pub struct RedirectRegistry {
    entries: dashmap::DashMap<String, RedirectEntry>,
    order: Mutex<VecDeque<String>>,
}

impl RedirectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a URL and return its 32-hex key.
    pub fn register(
        &self,
        url: &str,
        total_size: u64,
        password: &str,
        enc_type: EncType,
    ) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let digest = Md5::digest(format!("{url}:{total_size}:{nanos}").as_bytes());
        let key = hex::encode(digest);

        self.entries.insert(
            key.clone(),
            RedirectEntry {
                url: url.to_string(),
                total_size,
                password: password.to_string(),
                enc_type,
                expires_at: Instant::now() + ENTRY_TTL,
            },
        );

        let mut order = self.order.lock().expect("redirect order poisoned");
        order.push_back(key.clone());
        while order.len() > MAX_ENTRIES {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }

        key
    }

    /// Look up a key; expired entries are dropped on access.
    pub fn get(&self, key: &str) -> Option<RedirectEntry> {
        let entry = self.entries.get(key)?.clone();
        if entry.is_expired() {
            self.entries.remove(key);
            return None;
        }
        Some(entry)
    }

    /// Drop expired entries; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - self.entries.len();
        if removed > 0 {
            let mut order = self.order.lock().expect("redirect order poisoned");
            order.retain(|key| self.entries.contains_key(key));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_32_hex() {
        let registry = RedirectRegistry::new();
        let key = registry.register("https://cdn.example/abc", 4096, "pw", EncType::Aesctr);
        assert_eq!(key.len(), 32);
        assert!(key.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn register_then_get() {
        let registry = RedirectRegistry::new();
        let key = registry.register(
            "https://cdn.example/abc?sig=xyz",
            4096,
            "pw",
            EncType::Chacha20,
        );
        let entry = registry.get(&key).unwrap();
        assert_eq!(entry.url, "https://cdn.example/abc?sig=xyz");
        assert_eq!(entry.total_size, 4096);
        assert_eq!(entry.enc_type, EncType::Chacha20);
    }

    #[test]
    fn unknown_key_is_none() {
        let registry = RedirectRegistry::new();
        assert!(registry.get("0123456789abcdef0123456789abcdef").is_none());
    }

    #[test]
    fn sequential_registrations_do_not_collide() {
        let registry = RedirectRegistry::new();
        let mut keys = std::collections::HashSet::new();
        for i in 0..10_000u64 {
            let key = registry.register("https://cdn.example/same", i, "pw", EncType::Aesctr);
            assert!(keys.insert(key), "duplicate key at iteration {i}");
        }
    }

    #[test]
    fn fifo_eviction_keeps_the_cap() {
        let registry = RedirectRegistry::new();
        let first = registry.register("https://cdn.example/first", 1, "pw", EncType::Aesctr);
        for i in 0..MAX_ENTRIES as u64 {
            registry.register("https://cdn.example/fill", i, "pw", EncType::Aesctr);
        }
        assert!(registry.len() <= MAX_ENTRIES);
        assert!(registry.get(&first).is_none(), "oldest entry must be evicted");
    }
}
