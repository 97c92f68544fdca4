//! Per-submission IV generation.

use chacha20poly1305::aead::{AeadCore, OsRng};
use chacha20poly1305::ChaCha20Poly1305;

use submitvault_common::{Iv, IV_LENGTH};

/// Generate a fresh IV for one submission.
///
/// Drawn from the operating system CSPRNG; never derived from time or
/// counters. Called exactly once per ingest.
pub fn generate_iv() -> Iv {
    let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
    let mut bytes = [0u8; IV_LENGTH];
    bytes.copy_from_slice(&nonce);
    Iv::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_iv_length_matches_cipher() {
        let iv = generate_iv();
        assert_eq!(iv.as_bytes().len(), 12);
    }

    #[test]
    fn test_iv_no_collisions_in_large_sample() {
        let mut seen = HashSet::new();
        for _ in 0..100_000 {
            assert!(seen.insert(*generate_iv().as_bytes()));
        }
    }

    #[test]
    fn test_iv_unique_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    (0..5_000)
                        .map(|_| *generate_iv().as_bytes())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for iv in handle.join().unwrap() {
                assert!(seen.insert(iv));
            }
        }
        assert_eq!(seen.len(), 40_000);
    }
}
