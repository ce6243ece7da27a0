//! Integrity tags for cached payloads
//!
//! Tamper detection only: the tag is an unkeyed SHA-256 digest of the exact
//! payload string, so anyone can recompute it. It turns silent corruption of
//! local storage into a detectable mismatch, nothing more.

use sha2::{Digest, Sha256};
use thiserror::Error;

pub type Hash = [u8; 32];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("integrity tag mismatch")]
    TagMismatch,
}

pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Lowercase hex SHA-256 of `payload`
pub fn integrity_tag(payload: &str) -> String {
    hex::encode(sha256(payload.as_bytes()))
}

pub fn verify_tag(payload: &str, tag: &str) -> Result<(), CryptoError> {
    if integrity_tag(payload) == tag {
        Ok(())
    } else {
        Err(CryptoError::TagMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        assert_eq!(
            integrity_tag("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_uppercase_tag_rejected() {
        let tag = integrity_tag("{\"id\":\"0x1\"}").to_uppercase();
        assert_eq!(verify_tag("{\"id\":\"0x1\"}", &tag), Err(CryptoError::TagMismatch));
    }
}
