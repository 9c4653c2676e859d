// src/api/handlers/upload.rs
use actix_web::{http::header, web, HttpRequest, HttpResponse};
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use multer::{Constraints, SizeLimit};
use crate::api::AppState;
use crate::errors::{RelayError, Result};
use crate::storage;

const VIDEO_FIELD: &str = "video";

/// Request body chunks buffered between the connection and the multipart parser.
const BODY_QUEUE_CAPACITY: usize = 8;

/// Accept the upload form, stream the `video` field to disk and redirect to its results page.
pub async fn upload_video(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Payload,
) -> Result<HttpResponse> {
    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let boundary = multer::parse_boundary(content_type)?;

    let constraints = Constraints::new()
        .size_limit(SizeLimit::new().whole_stream(state.config.max_upload_bytes));
    let mut multipart = multer::Multipart::with_constraints(body_stream(payload), boundary, constraints);

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }

        let original_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| RelayError::InvalidFilename(String::new()))?;

        let upload = storage::store_upload(&state.config.upload_dir, &original_name, field)
            .await
            .inspect_err(|e| log::error!("Failed to store upload {:?}: {}", original_name, e))?;
        let job_id = state.jobs.create(upload).await;

        return Ok(HttpResponse::Found()
            .insert_header((header::LOCATION, format!("/output?job={}", job_id)))
            .finish());
    }

    log::warn!("Upload rejected: no '{}' field", VIDEO_FIELD);
    Err(RelayError::MissingField(VIDEO_FIELD.to_string()))
}

/// Hand the request body to the parser as a `Send` stream.
///
/// `web::Payload` is tied to the worker thread, so a local task pumps it into a
/// bounded channel. The pump stops as soon as the parser drops the receiver.
fn body_stream(
    mut payload: web::Payload,
) -> mpsc::Receiver<std::result::Result<web::Bytes, std::io::Error>> {
    let (mut tx, rx) = mpsc::channel(BODY_QUEUE_CAPACITY);
    actix_web::rt::spawn(async move {
        while let Some(chunk) = payload.next().await {
            let chunk = chunk.map_err(|e| std::io::Error::other(e.to_string()));
            let failed = chunk.is_err();
            if tx.send(chunk).await.is_err() || failed {
                break;
            }
        }
    });
    rx
}
