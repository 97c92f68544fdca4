//! Common utilities and types shared across SubmitVault modules.
//!
//! This module provides foundational types that are used throughout the codebase,
//! ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    sanitize_file_name, ByteStream, Iv, SensitiveBytes, Submission, SubmissionId, IV_LENGTH,
};
