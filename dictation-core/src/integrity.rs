//! Integrity: SHA-256 digest over the encoded payload body, verified on decode.

use sha2::{Digest, Sha256};

/// Digest length appended to every encoded payload.
pub const DIGEST_LEN: usize = 32;

/// Hash a payload body. Returns 32-byte digest.
pub fn digest(body: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(body);
    hasher.finalize().into()
}

/// Verify a payload body against the digest that travelled with it.
pub fn verify(body: &[u8], expected: &[u8]) -> bool {
    expected.len() == DIGEST_LEN && digest(body).as_slice() == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_verify_roundtrip() {
        let body = b"recording body";
        let d = digest(body);
        assert!(verify(body, &d));
    }

    #[test]
    fn verify_rejects_tampered() {
        let d = digest(b"recording body");
        assert!(!verify(b"recording bodz", &d));
    }

    #[test]
    fn verify_rejects_short_digest() {
        let d = digest(b"x");
        assert!(!verify(b"x", &d[..16]));
    }
}
