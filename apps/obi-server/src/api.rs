//! API handlers for the Obi-Tuke server
//!
//! Provides REST endpoints for:
//! - Band replacement (`POST /process`)
//! - Recently processed jobs
//! - Liveness checks

use std::time::Duration;

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use obi_core::{
    output_file_name, BandSettings, Composited, Compositor, ImageReplacement, JobRecord,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::AppState;

const MB: usize = 1024 * 1024;

/// Root response
#[derive(Serialize)]
pub struct RootResponse {
    pub message: &'static str,
    pub version: &'static str,
}

/// Handler: GET /
pub async fn handle_root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Obi-Tuke API is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Handler: GET /health
pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "obi-tuke-api",
    })
}

/// Job list response
#[derive(Serialize)]
pub struct JobListResponse {
    pub success: bool,
    pub jobs: Vec<JobRecord>,
    pub count: usize,
}

/// Handler: GET /jobs
///
/// Newest first.
pub async fn handle_list_jobs(State(state): State<AppState>) -> Json<JobListResponse> {
    let jobs: Vec<JobRecord> =
        state.with_history(|history| history.iter().rev().cloned().collect());
    let count = jobs.len();
    Json(JobListResponse {
        success: true,
        jobs,
        count,
    })
}

/// Uploaded file part
struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// Parts of a `/process` request
#[derive(Default)]
struct ProcessForm {
    pdf: Option<Upload>,
    settings: Option<String>,
    image: Option<Upload>,
}

/// Handler: POST /process
///
/// Multipart fields: `pdf` (file), `settings` (JSON), `replaceImage`
/// (optional file). Responds with the processed PDF as an attachment.
///
/// The timeout covers waiting for a worker permit and the composite itself.
/// A composite cannot be interrupted: after a 408 it runs to completion on
/// the blocking pool and holds its permit until then.
pub async fn handle_process(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    let form = read_form(multipart, &state).await?;

    let Upload {
        file_name,
        bytes: pdf_bytes,
        ..
    } = form
        .pdf
        .ok_or_else(|| ServerError::InvalidRequest("missing 'pdf' file".into()))?;
    let settings_json = form
        .settings
        .ok_or_else(|| ServerError::InvalidRequest("missing 'settings' field".into()))?;

    let settings: BandSettings = serde_json::from_str(&settings_json)
        .map_err(|e| ServerError::InvalidRequest(format!("invalid settings: {}", e)))?;

    let image = match form.image {
        Some(upload) => {
            let is_image = upload
                .content_type
                .as_deref()
                .is_some_and(|ct| ct.starts_with("image/"));
            if !is_image {
                return Err(ServerError::UnsupportedMediaType(
                    "replacement must be an image file".into(),
                ));
            }
            Some(ImageReplacement::from_bytes(upload.bytes)?)
        }
        None => None,
    };

    let band = settings.clone().into_spec(image)?;

    info!(
        "Process request: file={:?}, {} bytes, band {}mm at {}mm",
        file_name,
        pdf_bytes.len(),
        band.geometry.height_mm(),
        band.geometry.y_offset_mm()
    );

    let compositor = Compositor::new(state.options.clone());
    let workers = state.workers.clone();
    let work = async move {
        let permit = workers
            .acquire_owned()
            .await
            .map_err(|e| ServerError::Internal(format!("worker pool closed: {}", e)))?;
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            compositor.composite(&pdf_bytes, &band)
        });
        let result = task
            .await
            .map_err(|e| ServerError::Internal(format!("processing task failed: {}", e)))?;
        result.map_err(ServerError::from)
    };

    let composited: Composited =
        match tokio::time::timeout(Duration::from_millis(state.timeout_ms), work).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Processing exceeded {}ms", state.timeout_ms);
                return Err(ServerError::Timeout(state.timeout_ms));
            }
        };

    if !composited.overflow_pages.is_empty() {
        debug!("Band runs past the page on pages {:?}", composited.overflow_pages);
    }

    let output_name = output_file_name(file_name.as_deref());
    let record = JobRecord::new(
        file_name.unwrap_or_default(),
        output_name.clone(),
        settings,
        composited.page_count,
    );
    let job_id = record.job_id;
    state.with_history(|history| history.push(record));

    info!(
        "Processed {} page(s) into {} ({} bytes)",
        composited.page_count,
        output_name,
        composited.bytes.len()
    );

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(header::CONTENT_DISPOSITION, content_disposition(&output_name));
    if let Ok(value) = HeaderValue::from_str(&job_id.to_string()) {
        headers.insert("x-job-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&composited.page_count.to_string()) {
        headers.insert("x-page-count", value);
    }

    Ok((StatusCode::OK, headers, composited.bytes).into_response())
}

async fn read_form(
    mut multipart: Multipart,
    state: &AppState,
) -> Result<ProcessForm, ServerError> {
    let mut form = ProcessForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge {
                what: "Request",
                limit_mb: state.limits.max_request_bytes() / MB,
            }
        } else {
            ServerError::InvalidRequest(format!("malformed multipart body: {}", e.body_text()))
        }
    })? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "pdf" => {
                let upload = read_upload(field, "PDF", state.limits.max_pdf_bytes).await?;
                form.pdf = Some(upload);
            }
            "replaceImage" => {
                let upload = read_upload(field, "Image", state.limits.max_image_bytes).await?;
                // Browsers send an empty part when no file was chosen
                if !upload.bytes.is_empty() {
                    form.image = Some(upload);
                }
            }
            "settings" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ServerError::InvalidRequest(format!("unreadable settings: {}", e)))?;
                form.settings = Some(text);
            }
            other => {
                debug!("Ignoring unknown multipart field '{}'", other);
            }
        }
    }

    Ok(form)
}

async fn read_upload(
    field: Field<'_>,
    what: &'static str,
    limit: usize,
) -> Result<Upload, ServerError> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(|e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge {
                what,
                limit_mb: limit / MB,
            }
        } else {
            ServerError::InvalidRequest(format!("failed to read {}: {}", what, e.body_text()))
        }
    })?;

    if bytes.len() > limit {
        return Err(ServerError::PayloadTooLarge {
            what,
            limit_mb: limit / MB,
        });
    }

    Ok(Upload {
        file_name,
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// `attachment` disposition, with an RFC 5987 `filename*` for non-ASCII names
pub fn content_disposition(file_name: &str) -> HeaderValue {
    let is_plain = file_name
        .bytes()
        .all(|b| (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ');

    let value = if is_plain {
        format!("attachment; filename=\"{}\"", file_name)
    } else {
        let encoded: String = file_name
            .bytes()
            .map(|b| {
                if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
                    (b as char).to_string()
                } else {
                    format!("%{:02X}", b)
                }
            })
            .collect();
        format!(
            "attachment; filename=\"modified.pdf\"; filename*=UTF-8''{}",
            encoded
        )
    };

    HeaderValue::from_str(&value)
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"modified.pdf\""))
}
