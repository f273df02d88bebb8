//! One-way identifier digests
//!
//! Identifiers such as patient or study ids are subject-identifying. Anything
//! derived from them that ends up on disk goes through these helpers so the
//! stored name cannot be mapped back to the identifier.

use sha2::{Digest, Sha224};

/// Hex-encoded SHA-224 of a UTF-8 string (56 lowercase hex characters)
pub fn sha224_hex(value: &str) -> String {
    sha224_bytes_hex(value.as_bytes())
}

/// Hex-encoded SHA-224 of raw bytes
pub fn sha224_bytes_hex(data: &[u8]) -> String {
    let mut hasher = Sha224::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
