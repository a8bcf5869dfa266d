//! HTTP request handlers
//!
//! Every conversion endpoint takes a multipart upload with a `file` part and a
//! target `format` (form part or query parameter) and answers with the
//! converted file as an attachment.

use axum::{
    extract::{Multipart, Query, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::{Bytes, BytesMut};
use media_convert_lib::{
    cancel_after, policy, CancellationToken, ConversionError, ConversionRequest, ConversionResult,
    MediaKind, ValidationError,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ServerError;
use crate::state::AppState;

// helper.
macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
        RE.get_or_init(|| regex::Regex::new($re).expect("valid regex"))
    }};
}

/// Format given in the query string
#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// Parsed multipart body
#[derive(Debug)]
struct Upload {
    bytes: Bytes,
    file_name: String,
    format: Option<String>,
}

/// Read the multipart body. The `file` part is read chunk by chunk and
/// rejected as soon as it passes `limit`, without reading the rest.
async fn read_upload(
    mut multipart: Multipart,
    kind: MediaKind,
    limit: Option<u64>,
) -> Result<Upload, ServerError> {
    let mut file: Option<(Bytes, String)> = None;
    let mut format = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(|e| {
                    ServerError::BadRequest(format!("failed to read uploaded file: {}", e))
                })? {
                    data.extend_from_slice(&chunk);
                    let size = data.len() as u64;
                    if let Some(limit) = limit.filter(|limit| size > *limit) {
                        return Err(ConversionError::from(ValidationError::TooLarge {
                            kind,
                            size,
                            limit,
                        })
                        .into());
                    }
                }
                file = Some((data.freeze(), file_name));
            }
            Some("format") => {
                let value = field.text().await.map_err(|e| {
                    ServerError::BadRequest(format!("failed to read format field: {}", e))
                })?;
                format = Some(value);
            }
            other => {
                tracing::debug!(field = ?other, "ignoring multipart field");
            }
        }
    }

    let (bytes, file_name) =
        file.ok_or_else(|| ServerError::BadRequest("missing 'file' field".to_string()))?;

    Ok(Upload {
        bytes,
        file_name,
        format,
    })
}

/// Shared body of the conversion endpoints
async fn convert_upload(
    state: &AppState,
    kind: MediaKind,
    default_format: Option<&str>,
    query: FormatQuery,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    state.metrics.record_request(kind.as_str());

    // The converter reports its own failures to the metrics; these never reach it
    let request = match read_request(state, kind, default_format, query, multipart).await {
        Ok(request) => request,
        Err(e) => {
            tracing::info!(error = %e, "rejected upload");
            state.metrics.record_error(e.kind());
            return Err(e);
        }
    };

    let cancel = CancellationToken::new();
    let _deadline = state
        .config
        .request_timeout()
        .map(|timeout| cancel_after(&cancel, timeout));

    let converted = state.converter.convert(request, &cancel).await?;
    Ok(attachment(converted))
}

async fn read_request(
    state: &AppState,
    kind: MediaKind,
    default_format: Option<&str>,
    query: FormatQuery,
    multipart: Multipart,
) -> Result<ConversionRequest, ServerError> {
    let limit = state.converter.config().limits.limit_for(kind);
    let upload = read_upload(multipart, kind, limit).await?;
    let format = upload
        .format
        .or(query.format)
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .or_else(|| default_format.map(str::to_string))
        .ok_or_else(|| ServerError::BadRequest("missing 'format' field".to_string()))?;

    tracing::info!(
        %kind,
        format = %format,
        file_name = %upload.file_name,
        size = upload.bytes.len(),
        "received conversion request"
    );

    Ok(ConversionRequest::new(
        kind,
        upload.bytes,
        format,
        upload.file_name,
    ))
}

/// Build the download response for a finished conversion
fn attachment(result: ConversionResult) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(result.mime_type),
    );
    let disposition = format!(
        "attachment; filename=\"{}\"",
        header_safe_filename(&result.suggested_filename)
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(result.bytes.len()));

    (headers, result.bytes).into_response()
}

/// Replace anything that can not appear inside a quoted header value
fn header_safe_filename(name: &str) -> String {
    let cleaned = regex!(r#"[^\x20-\x7E]|["\\]"#).replace_all(name, "_");
    cleaned.into_owned()
}

/// POST /api/audio/convert
pub async fn convert_audio(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    convert_upload(&state, MediaKind::Audio, Some("mp3"), query, multipart).await
}

/// GET /api/audio/convert
pub async fn audio_info() -> &'static str {
    "This endpoint supports POST requests for audio conversion."
}

/// POST /api/convert
pub async fn convert_image(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    convert_upload(&state, MediaKind::Image, None, query, multipart).await
}

/// POST /api/video/convert
pub async fn convert_video(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    convert_upload(&state, MediaKind::Video, None, query, multipart).await
}

/// POST /api/document/convert
pub async fn convert_document(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
    multipart: Multipart,
) -> Result<Response, ServerError> {
    convert_upload(&state, MediaKind::Document, None, query, multipart).await
}

/// GET /api/formats
pub async fn list_formats() -> Json<Vec<policy::KindPolicy>> {
    Json(policy::table())
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

/// Version endpoint
pub async fn version_check() -> &'static str {
    concat!("media-converter v", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_safe_filename() {
        assert_eq!(header_safe_filename("song-converted.wav"), "song-converted.wav");
        assert_eq!(header_safe_filename("a\"b\\c.pdf"), "a_b_c.pdf");
        assert_eq!(header_safe_filename("line\r\nbreak.png"), "line__break.png");
        assert_eq!(header_safe_filename("café.mp4"), "caf_.mp4");
    }

    #[test]
    fn test_attachment_headers() {
        let response = attachment(ConversionResult {
            bytes: Bytes::from_static(b"RIFF"),
            mime_type: "audio/wav",
            suggested_filename: "take-converted.wav".to_string(),
        });
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "audio/wav");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"take-converted.wav\""
        );
        assert_eq!(headers[header::CONTENT_LENGTH], "4");
    }

    #[tokio::test]
    async fn test_version() {
        assert!(version_check().await.starts_with("media-converter v"));
    }
}
