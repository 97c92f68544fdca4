//! Streaming encryption for submission blobs.
//!
//! Plaintext is split into fixed-size frames that are sealed one by one, so
//! neither direction ever holds the whole file in memory.
//!
//! # Format
//! - Header: version (1 byte) + chunk_size (4 bytes, little endian)
//! - Frames: ciphertext + tag; every frame but the last carries exactly
//!   `chunk_size` plaintext bytes, the last carries `0..=chunk_size` and is
//!   always present
//!
//! Frame `i` uses the nonce `frame_nonce(iv, i)` and authenticates
//! header || final_flag, which pins order, length and the header itself.
//! The decryptor holds back the trailing frame until it knows whether more
//! input follows, and releases plaintext only after the tag verifies.

use futures::stream::{self, StreamExt};

use crate::aead::{frame_nonce, FrameCipher, TAG_SIZE};
use crate::keys::DerivedKey;
use submitvault_common::{ByteStream, Error, Iv, Result};

/// Default chunk size for streaming encryption (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest chunk size accepted in a blob header (16 MiB).
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Header size: version (1) + chunk_size (4).
pub const HEADER_SIZE: usize = 5;

/// Stream encryption version.
pub const STREAM_VERSION: u8 = 1;

const FLAG_MORE: u8 = 0;
const FLAG_FINAL: u8 = 1;

fn check_chunk_size(chunk_size: usize) -> bool {
    (1..=MAX_CHUNK_SIZE).contains(&chunk_size)
}

fn encode_header(chunk_size: usize) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = STREAM_VERSION;
    header[1..].copy_from_slice(&(chunk_size as u32).to_le_bytes());
    header
}

fn frame_aad(header: &[u8; HEADER_SIZE], flag: u8) -> [u8; HEADER_SIZE + 1] {
    let mut aad = [0u8; HEADER_SIZE + 1];
    aad[..HEADER_SIZE].copy_from_slice(header);
    aad[HEADER_SIZE] = flag;
    aad
}

/// Push-style encryptor: feed plaintext with `update`, close with `finalize`.
pub struct StreamEncryptor {
    cipher: FrameCipher,
    iv: Iv,
    header: [u8; HEADER_SIZE],
    chunk_size: usize,
    pending: Vec<u8>,
    next_index: u64,
    header_written: bool,
}

impl StreamEncryptor {
    /// Create an encryptor emitting frames of `chunk_size` plaintext bytes.
    ///
    /// # Errors
    /// - `Configuration` if `chunk_size` is zero or above `MAX_CHUNK_SIZE`
    pub fn with_chunk_size(key: &DerivedKey, iv: Iv, chunk_size: usize) -> Result<Self> {
        if !check_chunk_size(chunk_size) {
            return Err(Error::Configuration(format!(
                "Chunk size must be between 1 and {} bytes, got {}",
                MAX_CHUNK_SIZE, chunk_size
            )));
        }
        Ok(Self {
            cipher: FrameCipher::new(key),
            iv,
            header: encode_header(chunk_size),
            chunk_size,
            pending: Vec::with_capacity(chunk_size),
            next_index: 0,
            header_written: false,
        })
    }

    /// Consume plaintext, returning whatever ciphertext is ready.
    ///
    /// A full chunk is only sealed once at least one more byte is buffered,
    /// so the final frame is never emitted early.
    pub fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_header(&mut out);
        self.pending.extend_from_slice(data);

        let mut consumed = 0;
        while self.pending.len() - consumed > self.chunk_size {
            let chunk = &self.pending[consumed..consumed + self.chunk_size];
            let nonce = frame_nonce(&self.iv, self.next_index);
            let sealed = self
                .cipher
                .seal(&nonce, &frame_aad(&self.header, FLAG_MORE), chunk)?;
            out.extend_from_slice(&sealed);
            consumed += self.chunk_size;
            self.next_index += 1;
        }
        self.pending.drain(..consumed);

        Ok(out)
    }

    /// Seal the remaining plaintext as the final frame.
    pub fn finalize(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_header(&mut out);

        let nonce = frame_nonce(&self.iv, self.next_index);
        let sealed = self
            .cipher
            .seal(&nonce, &frame_aad(&self.header, FLAG_FINAL), &self.pending)?;
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn write_header(&mut self, out: &mut Vec<u8>) {
        if !self.header_written {
            out.extend_from_slice(&self.header);
            self.header_written = true;
        }
    }
}

/// Push-style decryptor: feed ciphertext with `update`, close with `finalize`.
///
/// Any framing or tag failure is reported as `Authentication`.
pub struct StreamDecryptor {
    cipher: FrameCipher,
    iv: Iv,
    header: Option<[u8; HEADER_SIZE]>,
    frame_len: usize,
    pending: Vec<u8>,
    next_index: u64,
}

impl StreamDecryptor {
    /// Create a decryptor for a blob sealed under `key` and `iv`.
    pub fn new(key: &DerivedKey, iv: Iv) -> Self {
        Self {
            cipher: FrameCipher::new(key),
            iv,
            header: None,
            frame_len: 0,
            pending: Vec::new(),
            next_index: 0,
        }
    }

    /// Consume ciphertext, returning plaintext of every verified frame.
    pub fn update(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.pending.extend_from_slice(data);

        let header = match self.header {
            Some(header) => header,
            None => {
                if self.pending.len() < HEADER_SIZE {
                    return Ok(Vec::new());
                }
                self.read_header()?
            }
        };

        let mut out = Vec::new();
        let mut consumed = 0;
        while self.pending.len() - consumed > self.frame_len {
            let frame = &self.pending[consumed..consumed + self.frame_len];
            let nonce = frame_nonce(&self.iv, self.next_index);
            let plaintext = self
                .cipher
                .open(&nonce, &frame_aad(&header, FLAG_MORE), frame)?;
            out.extend_from_slice(&plaintext);
            consumed += self.frame_len;
            self.next_index += 1;
        }
        self.pending.drain(..consumed);

        Ok(out)
    }

    /// Verify and open the final frame.
    ///
    /// # Errors
    /// - `Authentication` if the blob is truncated, extended or tampered
    pub fn finalize(self) -> Result<Vec<u8>> {
        let header = self
            .header
            .ok_or_else(|| Error::Authentication("Blob header truncated".to_string()))?;

        if self.pending.len() < TAG_SIZE || self.pending.len() > self.frame_len {
            return Err(Error::Authentication("Final frame malformed".to_string()));
        }

        let nonce = frame_nonce(&self.iv, self.next_index);
        self.cipher
            .open(&nonce, &frame_aad(&header, FLAG_FINAL), &self.pending)
    }

    fn read_header(&mut self) -> Result<[u8; HEADER_SIZE]> {
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&self.pending[..HEADER_SIZE]);

        if header[0] != STREAM_VERSION {
            return Err(Error::Authentication(format!(
                "Unsupported blob version: {}",
                header[0]
            )));
        }

        let mut size_bytes = [0u8; 4];
        size_bytes.copy_from_slice(&header[1..]);
        let chunk_size = u32::from_le_bytes(size_bytes) as usize;
        if !check_chunk_size(chunk_size) {
            return Err(Error::Authentication(format!(
                "Blob chunk size out of range: {}",
                chunk_size
            )));
        }

        self.pending.drain(..HEADER_SIZE);
        self.frame_len = chunk_size + TAG_SIZE;
        self.header = Some(header);
        Ok(header)
    }
}

type EncryptState<'a> = Option<(StreamEncryptor, ByteStream<'a>)>;
type DecryptState<'a> = Option<(StreamDecryptor, ByteStream<'a>)>;

/// Encrypt a plaintext byte stream into a blob stream.
///
/// Errors from `plaintext` are passed through unchanged and end the stream.
pub fn encrypt_stream<'a>(
    key: &DerivedKey,
    iv: Iv,
    chunk_size: usize,
    plaintext: ByteStream<'a>,
) -> Result<ByteStream<'a>> {
    let encryptor = StreamEncryptor::with_chunk_size(key, iv, chunk_size)?;
    let stream = stream::try_unfold(Some((encryptor, plaintext)), |state| next_ciphertext(state));
    Ok(Box::pin(stream))
}

async fn next_ciphertext(state: EncryptState<'_>) -> Result<Option<(Vec<u8>, EncryptState<'_>)>> {
    let Some((mut encryptor, mut source)) = state else {
        return Ok(None);
    };

    loop {
        match source.next().await {
            Some(chunk) => {
                let output = encryptor.update(&chunk?)?;
                if !output.is_empty() {
                    return Ok(Some((output, Some((encryptor, source)))));
                }
            }
            None => {
                let output = encryptor.finalize()?;
                return Ok(Some((output, None)));
            }
        }
    }
}

/// Decrypt a blob stream into a plaintext stream.
///
/// Only verified plaintext is yielded; the first failure ends the stream
/// with `Authentication` (or the source's own error).
pub fn decrypt_stream<'a>(key: &DerivedKey, iv: Iv, ciphertext: ByteStream<'a>) -> ByteStream<'a> {
    let decryptor = StreamDecryptor::new(key, iv);
    Box::pin(stream::try_unfold(Some((decryptor, ciphertext)), |state| {
        next_plaintext(state)
    }))
}

async fn next_plaintext(state: DecryptState<'_>) -> Result<Option<(Vec<u8>, DecryptState<'_>)>> {
    let Some((mut decryptor, mut source)) = state else {
        return Ok(None);
    };

    loop {
        match source.next().await {
            Some(chunk) => {
                let output = decryptor.update(&chunk?)?;
                if !output.is_empty() {
                    return Ok(Some((output, Some((decryptor, source)))));
                }
            }
            None => {
                let output = decryptor.finalize()?;
                if output.is_empty() {
                    return Ok(None);
                }
                return Ok(Some((output, None)));
            }
        }
    }
}

/// Encrypt a complete byte slice.
///
/// This is a convenience function for when the complete data is available.
pub fn encrypt_bytes(key: &DerivedKey, iv: Iv, chunk_size: usize, data: &[u8]) -> Result<Vec<u8>> {
    let mut encryptor = StreamEncryptor::with_chunk_size(key, iv, chunk_size)?;
    let mut output = encryptor.update(data)?;
    output.extend(encryptor.finalize()?);
    Ok(output)
}

/// Decrypt a complete blob held in memory.
pub fn decrypt_bytes(key: &DerivedKey, iv: Iv, data: &[u8]) -> Result<Vec<u8>> {
    let mut decryptor = StreamDecryptor::new(key, iv);
    let mut output = decryptor.update(data)?;
    output.extend(decryptor.finalize()?);
    Ok(output)
}
