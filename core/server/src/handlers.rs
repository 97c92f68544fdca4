//! Route handlers.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{stream, StreamExt};
use serde::Serialize;

use crate::error::ApiResult;
use crate::form::{buffer_field, field_stream, limit_size, multipart_error, SubmissionForm};
use crate::AppState;
use submitvault_common::{Error, Submission, SubmissionId};
use submitvault_pipeline::Download;

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub message: String,
    pub id: SubmissionId,
}

/// Public view of a submission. Never carries the IV.
#[derive(Debug, Serialize)]
pub struct SubmissionSummary {
    pub id: SubmissionId,
    pub name: String,
    pub email: String,
    pub genre: String,
    pub filepath: String,
}

impl From<Submission> for SubmissionSummary {
    fn from(submission: Submission) -> Self {
        Self {
            filepath: submission.download_path(),
            id: submission.id,
            name: submission.name,
            email: submission.email,
            genre: submission.genre,
        }
    }
}

/// `POST /submit`
///
/// Text parts are collected first. A file part that follows them is
/// encrypted while it is still being received; one that precedes them is
/// buffered in memory up to the upload limit.
pub async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let max_bytes = state.max_upload_bytes;
    let mut form = SubmissionForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(field_name) = field.name().map(str::to_owned) else {
            continue;
        };

        // Only a part carrying a filename counts as the uploaded file.
        if field_name == "file" && field.file_name().is_some() {
            let file_name = field.file_name().map(str::to_owned);
            if form.has_all_text() {
                form.check()?;
                let body = limit_size(field_stream(field), max_bytes);
                let upload = form.into_streaming_upload(file_name, body);
                let submission = state.pipelines.ingest.ingest(upload).await?;
                return Ok(submitted(submission));
            }
            let data = buffer_field(field, max_bytes).await?;
            form.buffer_file(file_name, data);
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.set_text(&field_name, value);
        }
    }

    form.check()?;
    let submission = state
        .pipelines
        .ingest
        .ingest(form.into_buffered_upload())
        .await?;
    Ok(submitted(submission))
}

fn submitted(submission: Submission) -> Json<SubmitResponse> {
    Json(SubmitResponse {
        message: "Submission successful!".to_string(),
        id: submission.id,
    })
}

/// `GET /download/{id}`
///
/// The first plaintext chunk is decrypted before the response starts, so a
/// blob that fails authentication up front is answered with a 500. Later
/// failures abort the body mid-stream.
pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let id = SubmissionId::parse(&id)
        .map_err(|_| Error::NotFound(format!("Submission not found: {}", id)))?;

    let Download {
        submission,
        mut body,
    } = state.pipelines.egress.open(&id).await?;
    let first = body.next().await.transpose()?;
    let body = stream::iter(first.map(Ok::<_, Error>)).chain(body);

    let disposition = format!("attachment; filename=\"{}\"", submission.attachment_name());
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

/// `GET /submissions`
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<SubmissionSummary>>> {
    let submissions = state.pipelines.egress.list().await?;
    Ok(Json(
        submissions.into_iter().map(SubmissionSummary::from).collect(),
    ))
}
