// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Content integrity: SHA-256 hashing for tamper detection.

use fleetdoc_core::error::{FleetdocError, Result};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
///
/// Used to fingerprint original uploads, every derivative and the generated
/// protocol document.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// `true` when `data` hashes to `expected_hex`. Hex case is ignored.
pub fn verify(data: &[u8], expected_hex: &str) -> bool {
    hash_bytes(data).eq_ignore_ascii_case(expected_hex.trim())
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Returns `Err(FleetdocError::IntegrityMismatch)` with the expected and
/// actual values when it does not.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<()> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex.trim()) {
        Ok(())
    } else {
        Err(FleetdocError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

/// A well-formed digest is exactly 64 hex characters.
pub(crate) fn is_hex_digest(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// SHA-256 of the empty byte slice (well-known constant).
    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
    }

    #[test]
    fn hash_known_value() {
        let expected = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
        assert_eq!(hash_bytes(b"hello"), expected);
    }

    #[test]
    fn hash_is_deterministic() {
        let data = vec![7u8; 4096];
        assert_eq!(hash_bytes(&data), hash_bytes(&data.clone()));
    }

    #[test]
    fn verify_ignores_hex_case() {
        let upper = hash_bytes(b"fleetdoc").to_uppercase();
        assert!(verify(b"fleetdoc", &upper));
        assert!(verify_hash(b"fleetdoc", &upper).is_ok());
    }

    #[test]
    fn single_bit_flip_fails() {
        let mut data = b"protocol".to_vec();
        let digest = hash_bytes(&data);
        data[0] ^= 0x01;
        assert!(!verify(&data, &digest));
    }

    #[test]
    fn verify_mismatched_hash() {
        let result = verify_hash(b"a", "0000");
        match result.unwrap_err() {
            FleetdocError::IntegrityMismatch { expected, actual } => {
                assert_eq!(expected, "0000");
                assert_eq!(actual, hash_bytes(b"a"));
            }
            other => panic!("unexpected error variant: {other}"),
        }
    }

    #[test]
    fn digest_shape() {
        assert!(is_hex_digest(EMPTY_SHA256));
        assert!(!is_hex_digest("abc"));
        assert!(!is_hex_digest(&"z".repeat(64)));
    }

    proptest! {
        #[test]
        fn any_single_byte_mutation_fails_verification(
            data in proptest::collection::vec(any::<u8>(), 1..2048),
            position in any::<prop::sample::Index>(),
            delta in 1u8..=255,
        ) {
            let digest = hash_bytes(&data);
            prop_assert_eq!(&hash_bytes(&data), &digest);
            prop_assert!(verify(&data, &digest));

            let mut mutated = data.clone();
            let at = position.index(mutated.len());
            mutated[at] = mutated[at].wrapping_add(delta);
            prop_assert!(!verify(&mutated, &digest));
        }

        #[test]
        fn digest_is_fixed_length_hex(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let digest = hash_bytes(&data);
            prop_assert_eq!(digest.len(), 64);
            prop_assert!(is_hex_digest(&digest));
        }
    }
}
