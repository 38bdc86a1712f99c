use axum::extract::{Multipart, Path, Query, State};
use axum::http::uri::Authority;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, instrument};

use super::AppState;
use crate::db::ImageRecord;
use crate::error::Error;
use crate::service::{Origin, Upload};
use crate::storage::filename_from_address;

#[derive(Debug, Serialize)]
pub(crate) struct ImageId {
    id: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PaintParams {
    color: Option<String>,
}

/// HTTP status an error is reported with.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Detection { status, .. } => StatusCode::from_u16(*status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        Error::InvalidFilename(_) | Error::InvalidColor(_) | Error::BadRequest(_) => {
            StatusCode::BAD_REQUEST
        }
        Error::DetectionTransport(_) | Error::Fetch { .. } => StatusCode::BAD_GATEWAY,
        Error::ImageDecode(_)
        | Error::Io(_)
        | Error::Database(_)
        | Error::Json(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        match self {
            // The upstream body is passed through untouched.
            Error::Detection { payload, .. } => (status, Json(payload)).into_response(),
            other => (status, Json(json!({ "detail": other.to_string() }))).into_response(),
        }
    }
}

/// Run a blocking service call off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T, Error>
where
    F: FnOnce() -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("worker task failed: {}", e)))?
}

/// Host and port the client addressed, from the `Host` header.
fn request_origin(headers: &HeaderMap, fallback: &Origin) -> Origin {
    headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_host)
        .unwrap_or_else(|| fallback.clone())
}

/// Parse a `Host` header value as a URI authority. Anything that isn't a
/// plain `host[:port]` is rejected so it never reaches a stored address.
fn parse_host(value: &str) -> Option<Origin> {
    let authority: Authority = value.trim().parse().ok()?;
    let host = authority.host();
    if host.is_empty() || authority.as_str().contains('@') {
        return None;
    }

    // `port_u16` is `None` both for "no port" and for a non-numeric one.
    let has_port = authority.as_str().len() > host.len();
    let port = match authority.port_u16() {
        Some(port) => port,
        None if has_port => return None,
        None => 80,
    };
    Some(Origin {
        host: host.to_string(),
        port,
    })
}

/// Pull the image file and optional title out of a multipart body. The first
/// part carrying a filename is taken as the image.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, Error> {
    let bad_request = |e: axum::extract::multipart::MultipartError| Error::BadRequest(e.body_text());

    let mut file = None;
    let mut title = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(filename) if file.is_none() => {
                let bytes = field.bytes().await.map_err(bad_request)?;
                file = Some((filename, bytes.to_vec()));
            }
            Some(_) => {}
            None if name == "title" => {
                let text = field.text().await.map_err(bad_request)?;
                if !text.is_empty() {
                    title = Some(text);
                }
            }
            None => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| Error::BadRequest("missing image file".to_string()))?;
    Ok(Upload {
        filename,
        title,
        bytes,
    })
}

pub(crate) async fn list_images(
    State(state): State<AppState>,
) -> Result<Json<Vec<ImageRecord>>, Error> {
    let service = state.service.clone();
    let images = run_blocking(move || service.list()).await?;
    Ok(Json(images))
}

#[instrument(skip_all)]
pub(crate) async fn create_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ImageId>, Error> {
    let upload = read_upload(multipart).await?;
    let origin = request_origin(&headers, &state.fallback_origin);

    let service = state.service.clone();
    let id = run_blocking(move || service.create(&upload, &origin)).await?;
    Ok(Json(ImageId { id }))
}

#[instrument(skip(state))]
pub(crate) async fn paint_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<PaintParams>,
) -> Result<Response, Error> {
    let color = params.color.filter(|c| !c.trim().is_empty());

    let service = state.service.clone();
    let jpeg = run_blocking(move || service.paint(id, color.as_deref())).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

#[instrument(skip(state, headers, multipart))]
pub(crate) async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<ImageId>, Error> {
    let upload = read_upload(multipart).await?;
    let origin = request_origin(&headers, &state.fallback_origin);

    let service = state.service.clone();
    let id = run_blocking(move || service.update(id, &upload, &origin)).await?;
    Ok(Json(ImageId { id }))
}

#[instrument(skip(state))]
pub(crate) async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, Error> {
    let service = state.service.clone();
    run_blocking(move || service.remove(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn serve_static(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    if filename_from_address(&filename) != Some(filename.as_str()) || filename.contains('\\') {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state.service.store().image_path(&filename);
    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = image::ImageFormat::from_path(&path)
                .map(|format| format.to_mime_type())
                .unwrap_or("application/octet-stream");
            ([(header::CONTENT_TYPE, mime)], bytes).into_response()
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(e) => Error::from(e).into_response(),
    }
}
