use std::fmt::Write;

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Canonical textual form of a JSON value: object keys sorted
/// lexicographically at every depth, no whitespace, UTF-8.
///
/// `serde_json`'s default `Map` is ordered by key, so any `Value` parsed
/// from client text re-serializes in canonical form already.
pub fn canonical_json(value: &Value) -> String {
    value.to_string()
}

/// SHA-256 of the canonical request body, as 64 lowercase hex chars.
pub fn request_hash(value: &Value) -> String {
    let digest = Sha256::digest(canonical_json(value).as_bytes());

    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
