//! Unit tests for cooldown module

use lottery_client::{Address, DrawCooldown, MemoryStore, SecureCache, DRAW_COOLDOWN};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_first_draw_allowed() {
    let cooldown = DrawCooldown::default();
    // No marker: nothing to wait for
    assert_eq!(cooldown.remaining_ms(None, 1_000), 0);
    assert!(cooldown.is_ready(None, 1_000));
}

#[test]
fn test_default_interval() {
    assert_eq!(DrawCooldown::default().interval(), DRAW_COOLDOWN);
    assert_eq!(DRAW_COOLDOWN, Duration::from_secs(30));
}

#[test]
fn test_cooldown_bounds() {
    let cooldown = DrawCooldown::default();
    let last = 1_700_000_000_000;

    assert_eq!(cooldown.remaining_ms(Some(last), last), 30_000);
    assert_eq!(cooldown.remaining_ms(Some(last), last + 29_999), 1);
    assert_eq!(cooldown.remaining_ms(Some(last), last + 30_000), 0);
    assert_eq!(cooldown.remaining_ms(Some(last), last + 90_000), 0);
}

#[test]
fn test_marker_is_per_address() {
    let cache = SecureCache::new(Arc::new(MemoryStore::new()));
    let alice = Address::from("0xA1");
    let bob = Address::from("0xB2");
    let cooldown = DrawCooldown::new(Duration::from_secs(30));

    cache.set_last_draw(&alice, 10_000).unwrap();

    assert_eq!(cooldown.check(&cache, &alice, 15_000), 25_000);
    assert_eq!(cooldown.check(&cache, &bob, 15_000), 0);
}
