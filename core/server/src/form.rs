//! Multipart submission form handling.

use axum::extract::multipart::{Field, MultipartError};
use futures::{future, stream, TryStreamExt};

use submitvault_common::{ByteStream, Error, Result};
use submitvault_pipeline::Upload;

/// Text fields collected so far, plus a file that arrived before them.
#[derive(Default)]
pub struct SubmissionForm {
    name: Option<String>,
    email: Option<String>,
    genre: Option<String>,
    buffered: Option<(Option<String>, Vec<u8>)>,
}

impl SubmissionForm {
    /// Record a text field. Unknown fields, and a `file` part sent as plain
    /// text, are ignored.
    pub fn set_text(&mut self, field: &str, value: String) {
        match field {
            "name" => self.name = Some(value),
            "email" => self.email = Some(value),
            "genre" => self.genre = Some(value),
            _ => {}
        }
    }

    /// Whether every text field has been seen, so the file can be streamed.
    pub fn has_all_text(&self) -> bool {
        self.name.is_some() && self.email.is_some() && self.genre.is_some()
    }

    /// Keep a file part that arrived before the text parts.
    pub fn buffer_file(&mut self, file_name: Option<String>, data: Vec<u8>) {
        self.buffered = Some((file_name, data));
    }

    /// Check the fields the pipeline treats as opaque.
    ///
    /// # Errors
    /// - `Validation` if the email is present but not shaped like one
    pub fn check(&self) -> Result<()> {
        let email = self.email.as_deref().map(str::trim).unwrap_or_default();
        if !email.is_empty() && !is_email(email) {
            return Err(Error::Validation(
                "Please enter a valid email address.".to_string(),
            ));
        }
        Ok(())
    }

    /// Build an upload whose file streams straight from the request.
    pub fn into_streaming_upload<'a>(
        self,
        file_name: Option<String>,
        file: ByteStream<'a>,
    ) -> Upload<'a> {
        Upload {
            name: self.name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            genre: self.genre.unwrap_or_default(),
            file_name,
            file: Some(file),
        }
    }

    /// Build an upload from the buffered file, if one was received.
    pub fn into_buffered_upload(self) -> Upload<'static> {
        let (file_name, file) = match self.buffered {
            Some((file_name, data)) => {
                let body: ByteStream<'static> = Box::pin(stream::iter([Ok(data)]));
                (file_name, Some(body))
            }
            None => (None, None),
        };

        Upload {
            name: self.name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            genre: self.genre.unwrap_or_default(),
            file_name,
            file,
        }
    }
}

/// `local@domain.tld` with no whitespace and a single `@`.
pub fn is_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

/// Translate a multipart failure. Client-side problems (malformed body,
/// body limit) become `Validation`.
pub fn multipart_error(err: MultipartError) -> Error {
    if err.status().is_client_error() {
        Error::Validation(format!("Malformed upload: {}", err.body_text()))
    } else {
        Error::Encryption(format!("Upload interrupted: {}", err.body_text()))
    }
}

/// Stream the content of a file field.
pub fn field_stream(field: Field<'_>) -> ByteStream<'_> {
    Box::pin(stream::try_unfold(field, |mut field| async move {
        match field.chunk().await {
            Ok(Some(chunk)) => Ok(Some((chunk.to_vec(), field))),
            Ok(None) => Ok(None),
            Err(e) => Err(multipart_error(e)),
        }
    }))
}

/// Fail the stream with `Validation` once more than `max_bytes` went through.
pub fn limit_size(body: ByteStream<'_>, max_bytes: u64) -> ByteStream<'_> {
    let mut seen = 0u64;
    Box::pin(body.and_then(move |chunk| {
        seen += chunk.len() as u64;
        future::ready(if seen > max_bytes {
            Err(too_large(max_bytes))
        } else {
            Ok(chunk)
        })
    }))
}

/// Read a whole file field into memory, bounded by `max_bytes`.
pub async fn buffer_field(field: Field<'_>, max_bytes: u64) -> Result<Vec<u8>> {
    limit_size(field_stream(field), max_bytes).try_concat().await
}

fn too_large(max_bytes: u64) -> Error {
    Error::Validation(format!(
        "File size must be less than {}.",
        human_size(max_bytes)
    ))
}

fn human_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;

    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{} KB", bytes / KIB)
    } else {
        format!("{} bytes", bytes)
    }
}
