//! Submission storage for SubmitVault.
//!
//! This module provides a trait-based interface over where submission
//! records and their ciphertext blobs live, with a filesystem backend and an
//! in-memory backend for tests.
//!
//! # Design Principles
//! - Atomic visibility: a record and its blob appear together or not at all
//! - Content addressing: blobs are keyed by submission id, never by a
//!   client-supplied path
//! - Streaming: blobs are written and read as byte streams

pub mod local;
pub mod memory;
pub mod store;

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use store::SubmissionStore;
