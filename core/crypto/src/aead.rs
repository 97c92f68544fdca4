//! Authenticated encryption of single stream frames using ChaCha20-Poly1305.
//!
//! Each frame of a submission blob is sealed under the shared key with a
//! nonce derived from the submission IV and the frame index, so no
//! (key, nonce) pair repeats within or across submissions.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::keys::DerivedKey;
use submitvault_common::{Error, Iv, Result, IV_LENGTH};

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Nonce for frame `index` of the stream started with `iv`.
///
/// The trailing eight bytes of the IV are XORed with the big-endian index.
pub fn frame_nonce(iv: &Iv, index: u64) -> [u8; IV_LENGTH] {
    let mut nonce = *iv.as_bytes();
    for (slot, byte) in nonce[IV_LENGTH - 8..].iter_mut().zip(index.to_be_bytes()) {
        *slot ^= byte;
    }
    nonce
}

/// AEAD cipher bound to one derived key.
pub struct FrameCipher {
    inner: ChaCha20Poly1305,
}

impl FrameCipher {
    /// Create a cipher for the given key.
    pub fn new(key: &DerivedKey) -> Self {
        Self {
            inner: ChaCha20Poly1305::new(Key::from_slice(key.as_bytes())),
        }
    }

    /// Seal one frame.
    ///
    /// # Postconditions
    /// - Returns ciphertext || tag, `plaintext.len() + TAG_SIZE` bytes long
    ///
    /// # Security
    /// - Caller is responsible for nonce uniqueness
    pub fn seal(&self, nonce: &[u8; IV_LENGTH], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.inner
            .encrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::Encryption("Frame encryption failed".to_string()))
    }

    /// Open one frame, verifying its tag before anything is returned.
    ///
    /// # Errors
    /// - `Authentication` if the frame is too short or does not verify
    pub fn open(&self, nonce: &[u8; IV_LENGTH], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < TAG_SIZE {
            return Err(Error::Authentication("Frame too short".to_string()));
        }

        self.inner
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| Error::Authentication("Frame failed authentication".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KEY_LENGTH;

    fn cipher(byte: u8) -> FrameCipher {
        FrameCipher::new(&DerivedKey::from_bytes([byte; KEY_LENGTH]))
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let cipher = cipher(42);
        let nonce = [1u8; IV_LENGTH];

        let sealed = cipher.seal(&nonce, b"aad", b"Hello, World!").unwrap();
        assert_eq!(sealed.len(), 13 + TAG_SIZE);

        let opened = cipher.open(&nonce, b"aad", &sealed).unwrap();
        assert_eq!(opened, b"Hello, World!");
    }

    #[test]
    fn test_wrong_key_fails() {
        let nonce = [1u8; IV_LENGTH];
        let sealed = cipher(1).seal(&nonce, b"", b"Secret data").unwrap();

        let result = cipher(2).open(&nonce, b"", &sealed);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let cipher = cipher(42);
        let nonce = [1u8; IV_LENGTH];
        let sealed = cipher.seal(&nonce, &[0], b"frame").unwrap();

        assert!(cipher.open(&nonce, &[1], &sealed).is_err());
    }

    #[test]
    fn test_tampered_frame_fails() {
        let cipher = cipher(42);
        let nonce = [9u8; IV_LENGTH];
        let mut sealed = cipher.seal(&nonce, b"", b"Important data").unwrap();
        sealed[5] ^= 0x01;

        assert!(matches!(
            cipher.open(&nonce, b"", &sealed),
            Err(Error::Authentication(_))
        ));
    }

    #[test]
    fn test_short_frame_rejected() {
        let result = cipher(42).open(&[0u8; IV_LENGTH], b"", &[0u8; TAG_SIZE - 1]);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_frame_nonce_distinct_per_index() {
        let iv = Iv::from_bytes([0xA5; IV_LENGTH]);
        assert_eq!(frame_nonce(&iv, 0), *iv.as_bytes());
        assert_ne!(frame_nonce(&iv, 1), frame_nonce(&iv, 2));
        assert_eq!(frame_nonce(&iv, 1)[..4], iv.as_bytes()[..4]);
    }
}
