use chrono::{DateTime, Utc};
use fnv::FnvHashMap;
use parking_lot::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    inserted_at: DateTime<Utc>,
}

/// In-process fallback map. Each entry remembers when it was written; entries older than the
/// TTL are purged on every write and ignored on read.
#[derive(Debug)]
pub struct MemoryBackend {
    ttl: chrono::Duration,
    entries: Mutex<FnvHashMap<String, MemoryEntry>>,
}

impl MemoryBackend {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            entries: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Insert `value` as written at `now`, then purge expired entries.
    pub fn insert(&self, key: String, value: String, now: DateTime<Utc>) {
        self.insert_at(key, value, now, now);
    }

    /// Insert `value` as if written at `inserted_at`, then purge entries expired as of `now`.
    pub fn insert_at(
        &self,
        key: String,
        value: String,
        inserted_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        let mut entries = self.entries.lock();
        entries.insert(key, MemoryEntry { value, inserted_at });
        Self::purge(&mut entries, self.ttl, now);
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<String> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| !is_expired(entry, self.ttl, now))
            .map(|entry| entry.value.clone())
    }

    /// Remove every entry older than the TTL as of `now`, returning how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        Self::purge(&mut entries, self.ttl, now)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn purge(
        entries: &mut FnvHashMap<String, MemoryEntry>,
        ttl: chrono::Duration,
        now: DateTime<Utc>,
    ) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| !is_expired(entry, ttl, now));
        before - entries.len()
    }
}

fn is_expired(entry: &MemoryEntry, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
    now - entry.inserted_at > ttl
}
