//! Cache layer tests: authenticated records, tamper detection, key scoping
//!
//! Run with: cargo test --test cache_test

use lottery_client::cache::{IdEntry, LastDrawEntry, LuckyNumberEntry};
use lottery_client::{
    cache_key, integrity_tag, Address, CachePurpose, KvStore, MemoryStore, ObjectId, SecureCache,
    SledStore,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn memory_cache() -> (Arc<MemoryStore>, SecureCache) {
    let store = Arc::new(MemoryStore::new());
    let cache = SecureCache::new(store.clone());
    (store, cache)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Nested {
    name: String,
    values: Vec<u64>,
    inner: Option<Box<Nested>>,
}

// =============================================================================
// ROUND TRIP
// =============================================================================

#[test]
fn test_set_then_get_returns_equal_value() {
    let (_, cache) = memory_cache();
    let value = Nested {
        name: "round".into(),
        values: vec![0, 42, u64::MAX],
        inner: Some(Box::new(Nested { name: "inner".into(), values: vec![], inner: None })),
    };

    cache.set("k", &value).unwrap();
    assert_eq!(cache.get::<Nested>("k"), Some(value));
}

#[test]
fn test_get_missing_is_absent() {
    let (_, cache) = memory_cache();
    assert_eq!(cache.get::<IdEntry>("nothing"), None);
}

#[test]
fn test_remove_is_idempotent() {
    let (store, cache) = memory_cache();
    cache.set("k", &LuckyNumberEntry { number: 1 }).unwrap();
    cache.remove("k");
    cache.remove("k");
    assert_eq!(store.get("k").unwrap(), None);
}

// =============================================================================
// TAMPER DETECTION
// =============================================================================

#[test]
fn test_tampered_payload_is_purged_for_every_key() {
    let (store, cache) = memory_cache();
    let address = Address::from("0xA1");

    for purpose in CachePurpose::ALL {
        let key = cache_key(purpose, &address);
        cache.set(&key, &IdEntry { id: ObjectId::from("0xT1") }).unwrap();

        // Swap the payload, keep the old tag
        let raw = store.get(&key).unwrap().unwrap();
        let mut record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        record["payload"] = serde_json::Value::String("{\"id\":\"0xEVIL\"}".into());
        store.set(&key, &record.to_string()).unwrap();

        assert_eq!(cache.get::<IdEntry>(&key), None, "{} accepted a forged payload", key);
        assert_eq!(store.get(&key).unwrap(), None, "{} was not purged", key);
    }
}

#[test]
fn test_tampered_tag_is_purged() {
    let (store, cache) = memory_cache();
    cache.set("k", &LastDrawEntry { timestamp: 5 }).unwrap();

    let raw = store.get("k").unwrap().unwrap();
    let mut record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    record["tag"] = serde_json::Value::String(integrity_tag("something else"));
    store.set("k", &record.to_string()).unwrap();

    assert_eq!(cache.get::<LastDrawEntry>("k"), None);
    assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn test_recomputed_tag_is_accepted() {
    // Not a secret: whoever rewrites payload and tag together passes
    let (store, cache) = memory_cache();
    let payload = "{\"number\":7}";
    let record = serde_json::json!({ "payload": payload, "tag": integrity_tag(payload) });
    store.set("k", &record.to_string()).unwrap();

    assert_eq!(cache.get::<LuckyNumberEntry>("k"), Some(LuckyNumberEntry { number: 7 }));
}

#[test]
fn test_malformed_records_are_purged() {
    let (store, cache) = memory_cache();
    let cases = [
        "not json at all",
        "{\"payload\":\"{}\"}",
        "{\"tag\":\"00\"}",
        "[1,2,3]",
        "",
    ];

    for raw in cases {
        store.set("k", raw).unwrap();
        assert_eq!(cache.get::<IdEntry>("k"), None, "accepted {:?}", raw);
        assert_eq!(store.get("k").unwrap(), None, "kept {:?}", raw);
    }
}

// =============================================================================
// KEY SCOPING
// =============================================================================

#[test]
fn test_entries_are_scoped_by_address_and_purpose() {
    let (_, cache) = memory_cache();
    let alice = Address::from("0xA1");
    let bob = Address::from("0xB2");

    cache.set_object_id(CachePurpose::Ticket, &alice, &ObjectId::from("0xT1")).unwrap();
    cache.set_object_id(CachePurpose::Lucky, &alice, &ObjectId::from("0xL1")).unwrap();
    cache.set_lucky_number(&alice, 42).unwrap();

    assert_eq!(cache.object_id(CachePurpose::Ticket, &alice), Some(ObjectId::from("0xT1")));
    assert_eq!(cache.object_id(CachePurpose::Lucky, &alice), Some(ObjectId::from("0xL1")));
    assert_eq!(cache.object_id(CachePurpose::Winner, &alice), None);
    assert_eq!(cache.lucky_number(&alice), Some(42));

    assert_eq!(cache.object_id(CachePurpose::Ticket, &bob), None);
    assert_eq!(cache.lucky_number(&bob), None);

    cache.purge(CachePurpose::Ticket, &alice);
    assert_eq!(cache.object_id(CachePurpose::Ticket, &alice), None);
    assert_eq!(cache.object_id(CachePurpose::Lucky, &alice), Some(ObjectId::from("0xL1")));
}

#[test]
fn test_persisted_layout() {
    let (store, cache) = memory_cache();
    let address = Address::from("0xA1");
    cache.set_object_id(CachePurpose::Ticket, &address, &ObjectId::from("0xT1")).unwrap();
    cache.set_last_draw(&address, 1_700_000_000_000).unwrap();

    let ticket: serde_json::Value =
        serde_json::from_str(&store.get("ticket_0xA1").unwrap().unwrap()).unwrap();
    assert_eq!(ticket["payload"], "{\"id\":\"0xT1\"}");
    assert_eq!(ticket["tag"], integrity_tag("{\"id\":\"0xT1\"}"));
    assert_eq!(ticket.as_object().unwrap().len(), 2);

    let last_draw: serde_json::Value =
        serde_json::from_str(&store.get("lastDraw_0xA1").unwrap().unwrap()).unwrap();
    assert_eq!(last_draw["payload"], "{\"timestamp\":1700000000000}");
}

#[test]
fn test_sled_backed_cache_survives_reopen() {
    let dir = std::env::temp_dir().join(format!("lottery_cache_test_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let address = Address::from("0xA1");

    {
        let store = Arc::new(SledStore::open(&dir).unwrap());
        let cache = SecureCache::new(store.clone());
        cache.set_object_id(CachePurpose::Winner, &address, &ObjectId::from("0xW1")).unwrap();
        store.flush().unwrap();
    }

    let cache = SecureCache::new(Arc::new(SledStore::open(&dir).unwrap()));
    assert_eq!(cache.object_id(CachePurpose::Winner, &address), Some(ObjectId::from("0xW1")));

    drop(cache);
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn test_sled_non_utf8_entry_is_purged() {
    let dir = std::env::temp_dir().join(format!("lottery_cache_utf8_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let address = Address::from("0xA1");

    {
        let db = sled::open(&dir).unwrap();
        db.insert(b"ticket_0xA1", &[0xff, 0xfe, 0x00][..]).unwrap();
        db.flush().unwrap();
    }

    let store = Arc::new(SledStore::open(&dir).unwrap());
    let cache = SecureCache::new(store.clone());
    assert_eq!(cache.object_id(CachePurpose::Ticket, &address), None);
    assert!(matches!(store.get("ticket_0xA1"), Ok(None)));

    drop(cache);
    drop(store);
    std::fs::remove_dir_all(dir).ok();
}
