//! Cryptographic primitives for SubmitVault.
//!
//! This module provides:
//! - Key derivation using Argon2id
//! - Per-submission IV generation from the OS CSPRNG
//! - Chunked authenticated encryption using ChaCha20-Poly1305
//! - Streaming encryption/decryption over byte streams
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext, key material or IV is ever logged
//! - Decryption never emits plaintext whose tag has not verified

pub mod aead;
pub mod iv;
pub mod kdf;
pub mod keys;
pub mod stream;

pub use iv::generate_iv;
pub use kdf::{derive_key, KdfParams};
pub use keys::{DerivedKey, Salt, KEY_LENGTH};
pub use stream::{
    decrypt_bytes, decrypt_stream, encrypt_bytes, encrypt_stream, StreamDecryptor,
    StreamEncryptor, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE,
};
