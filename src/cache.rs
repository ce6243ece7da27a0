//! Authenticated, address-scoped cache of lottery object references
//!
//! Every record is stored as `{"payload": <json string>, "tag": <hex tag>}`.
//! On read the tag is recomputed over the stored payload; a record that fails
//! to parse or whose tag does not match is deleted and reported as absent.
//! Reads never fail.

use crate::crypto::{integrity_tag, verify_tag};
use crate::store::{KvStore, StoreError};
use crate::types::{Address, ObjectId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a cache entry holds. Each purpose gets its own key per address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePurpose {
    Ticket,
    Lucky,
    Winner,
    LuckyNumber,
    LastDraw,
}

impl CachePurpose {
    pub const ALL: [CachePurpose; 5] = [
        CachePurpose::Ticket,
        CachePurpose::Lucky,
        CachePurpose::Winner,
        CachePurpose::LuckyNumber,
        CachePurpose::LastDraw,
    ];

    /// Key prefix. None of these contain `_`, so `prefix_address` is unambiguous.
    pub fn as_str(self) -> &'static str {
        match self {
            CachePurpose::Ticket => "ticket",
            CachePurpose::Lucky => "lucky",
            CachePurpose::Winner => "winner",
            CachePurpose::LuckyNumber => "luckyNumber",
            CachePurpose::LastDraw => "lastDraw",
        }
    }
}

/// Namespaced storage key for `(purpose, address)`
pub fn cache_key(purpose: CachePurpose, address: &Address) -> String {
    format!("{}_{}", purpose.as_str(), address)
}

/// Persisted record wrapping a payload with its integrity tag
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    payload: String,
    tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdEntry {
    pub id: ObjectId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LuckyNumberEntry {
    pub number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastDrawEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

#[derive(Clone)]
pub struct SecureCache {
    store: Arc<dyn KvStore>,
}

impl SecureCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), CacheError> {
        let payload = serde_json::to_string(value)?;
        let record = StoredRecord {
            tag: integrity_tag(&payload),
            payload,
        };
        self.store.set(key, &serde_json::to_string(&record)?)?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e @ StoreError::NotUtf8(_)) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                self.remove(key);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match decode::<T>(&raw) {
            Some(value) => Some(value),
            None => {
                warn!("Discarding tampered or malformed cache entry {}", key);
                self.remove(key);
                None
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("Cache remove failed for {}: {}", key, e);
        }
    }

    // -------------------------------------------------------------------------
    // Typed accessors
    // -------------------------------------------------------------------------

    pub fn object_id(&self, purpose: CachePurpose, address: &Address) -> Option<ObjectId> {
        self.get::<IdEntry>(&cache_key(purpose, address)).map(|e| e.id)
    }

    pub fn set_object_id(
        &self,
        purpose: CachePurpose,
        address: &Address,
        id: &ObjectId,
    ) -> Result<(), CacheError> {
        debug!("Caching {} {} for {}", purpose.as_str(), id, address);
        self.set(&cache_key(purpose, address), &IdEntry { id: id.clone() })
    }

    pub fn lucky_number(&self, address: &Address) -> Option<u64> {
        self.get::<LuckyNumberEntry>(&cache_key(CachePurpose::LuckyNumber, address))
            .map(|e| e.number)
    }

    pub fn set_lucky_number(&self, address: &Address, number: u64) -> Result<(), CacheError> {
        self.set(
            &cache_key(CachePurpose::LuckyNumber, address),
            &LuckyNumberEntry { number },
        )
    }

    pub fn last_draw(&self, address: &Address) -> Option<i64> {
        self.get::<LastDrawEntry>(&cache_key(CachePurpose::LastDraw, address))
            .map(|e| e.timestamp)
    }

    pub fn set_last_draw(&self, address: &Address, timestamp: i64) -> Result<(), CacheError> {
        self.set(
            &cache_key(CachePurpose::LastDraw, address),
            &LastDrawEntry { timestamp },
        )
    }

    pub fn purge(&self, purpose: CachePurpose, address: &Address) {
        debug!("Purging cached {} for {}", purpose.as_str(), address);
        self.remove(&cache_key(purpose, address));
    }
}

fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let record: StoredRecord = serde_json::from_str(raw).ok()?;
    verify_tag(&record.payload, &record.tag).ok()?;
    serde_json::from_str(&record.payload).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_keys_do_not_collide() {
        let a = Address::from("0xA");
        let b = Address::from("0xB");
        let mut keys: Vec<String> = CachePurpose::ALL
            .iter()
            .flat_map(|p| [cache_key(*p, &a), cache_key(*p, &b)])
            .collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(cache_key(CachePurpose::Ticket, &a), "ticket_0xA");
        assert_eq!(cache_key(CachePurpose::LuckyNumber, &a), "luckyNumber_0xA");
    }

    #[test]
    fn test_record_layout() {
        let store = Arc::new(MemoryStore::new());
        let cache = SecureCache::new(store.clone());
        cache.set("k", &IdEntry { id: ObjectId::from("0xT1") }).unwrap();

        let raw = store.get("k").unwrap().unwrap();
        let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["payload"], "{\"id\":\"0xT1\"}");
        assert_eq!(record["tag"], integrity_tag("{\"id\":\"0xT1\"}"));
    }

    #[test]
    fn test_wrong_shape_is_purged() {
        let store = Arc::new(MemoryStore::new());
        let cache = SecureCache::new(store.clone());
        cache.set("k", &LastDrawEntry { timestamp: 5 }).unwrap();

        assert_eq!(cache.get::<IdEntry>("k"), None);
        assert_eq!(store.get("k").unwrap(), None);
    }
}
