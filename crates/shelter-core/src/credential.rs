//! Shared-secret fingerprints

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a shared secret
pub fn fingerprint(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Check a presented secret against a stored fingerprint.
///
/// The whole secret is re-hashed; the stored fingerprint is compared
/// case-insensitively without an early exit.
pub fn verify(secret: &str, stored_fingerprint: &str) -> bool {
    let presented = fingerprint(secret);
    let stored = stored_fingerprint.trim().to_ascii_lowercase();

    if presented.len() != stored.len() {
        return false;
    }

    presented
        .bytes()
        .zip(stored.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
