//! Unit tests for crypto module
//!
//! Integrity tags are lowercase hex SHA-256 over the exact payload string.

use lottery_client::{integrity_tag, sha256, verify_tag};

#[test]
fn test_tag_deterministic() {
    let tag1 = integrity_tag("{\"id\":\"0xT1\"}");
    let tag2 = integrity_tag("{\"id\":\"0xT1\"}");
    assert_eq!(tag1, tag2);

    let tag3 = integrity_tag("{\"id\":\"0xT2\"}");
    assert_ne!(tag1, tag3);
}

#[test]
fn test_tag_format() {
    let tag = integrity_tag("any payload");
    assert_eq!(tag.len(), 64); // SHA-256 = 32 bytes
    assert!(tag.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
    assert_eq!(tag, hex::encode(sha256(b"any payload")));
}

#[test]
fn test_verify_accepts_matching_tag() {
    let payload = "{\"number\":42}";
    assert!(verify_tag(payload, &integrity_tag(payload)).is_ok());
}

#[test]
fn test_verify_rejects_altered_payload() {
    let tag = integrity_tag("{\"number\":42}");
    // Whitespace counts: the tag covers the exact string
    assert!(verify_tag("{\"number\": 42}", &tag).is_err());
    assert!(verify_tag("{\"number\":43}", &tag).is_err());
}
