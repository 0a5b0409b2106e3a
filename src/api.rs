use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    http::{header::HeaderValue, HeaderMap, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use uuid::Uuid;

use crate::{
    config::LimitsConfig,
    deck_service::DeckService,
    errors::{ApiError, ErrorContext, ErrorEnvelope},
    models::{FileUpload, GenerationOptions, SourceType},
    pdf,
    rate_limit::KeyedRateLimiter,
    transcription::TranscriptionChain,
};

// Import logging macros
use crate::{log_api_start, log_api_success, log_api_warn};

const AUDIO_MIME_ALLOWLIST: &[&str] = &[
    "audio/wav",
    "audio/x-wav",
    "audio/mp3",
    "audio/mpeg",
    "audio/mp4",
    "audio/m4a",
    "audio/x-m4a",
    "audio/webm",
    "audio/ogg",
];

#[derive(Clone)]
pub struct AppState {
    pub deck_service: Arc<DeckService>,
    pub transcription: Arc<TranscriptionChain>,
    pub rate_limiter: Arc<KeyedRateLimiter>,
    pub upload_dir: PathBuf,
    pub limits: LimitsConfig,
    pub include_error_details: bool,
    pub enrichment_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct GenerateTextRequest {
    pub content: Option<String>,
    pub tone: Option<String>,
    pub quantity: Option<String>,
    pub level: Option<String>,
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<ErrorEnvelope>)>;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.limits.max_file_size + 1024 * 1024;

    Router::new()
        .route("/", get(service_info))
        .route("/generate-flashcards", post(generate_text))
        .route("/generate-flashcards/pdf", post(generate_pdf))
        .route("/generate-flashcards/voice", post(generate_voice))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// CORS: configured allow-list plus unconditional allowance of localhost
/// origins for development.
pub fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed: Vec<String> = allowed_origins.to_vec();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let Ok(origin) = origin.to_str() else {
                return false;
            };
            is_localhost_origin(origin) || allowed.iter().any(|a| a == origin)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

fn is_localhost_origin(origin: &str) -> bool {
    let host = origin
        .strip_prefix("http://")
        .or_else(|| origin.strip_prefix("https://"))
        .unwrap_or(origin);
    let host = host.split(':').next().unwrap_or(host);
    host == "localhost" || host == "127.0.0.1" || host == "[::1]"
}

/// GET / — service metadata. Always 200 while the process is alive.
async fn service_info(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "flashdeck",
        "version": env!("CARGO_PKG_VERSION"),
        "features": {
            "pdf": true,
            "voice": true,
            "enrichment": state.enrichment_enabled,
        },
        "limits": {
            "maxContentLength": state.limits.max_content_length,
            "maxFileSize": state.limits.max_file_size,
            "maxFlashcards": state.limits.max_flashcards,
        },
    }))
}

/// POST /generate-flashcards — pasted text.
async fn generate_text(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<GenerateTextRequest>, JsonRejection>,
) -> ApiResult {
    let operation = "generate_text";
    log_api_start!(operation, source = "text");

    check_rate_limit(&state, &headers, operation)?;

    // An unparseable body still gets the standard error envelope.
    let Json(request) = payload.map_err(|rejection| {
        reject(
            ApiError::MalformedRequest(rejection.body_text()),
            &state,
            operation,
            "text",
        )
    })?;

    let content = request.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(reject(ApiError::EmptyContent, &state, operation, "text"));
    }
    // The content limit is a character count, not bytes.
    let content_chars = content.chars().count();
    if content_chars > state.limits.max_content_length {
        return Err(reject(
            ApiError::ContentTooLarge {
                length: content_chars,
                max: state.limits.max_content_length,
            },
            &state,
            operation,
            "text",
        ));
    }

    let options = GenerationOptions {
        tone: request.tone,
        quantity: request.quantity,
        level: request.level,
    };

    let result = state
        .deck_service
        .generate_deck(SourceType::Text, &content, &options)
        .await
        .map_err(|e| reject(e, &state, operation, "text"))?;

    log_api_success!(operation, count = result.flashcards.len(), "flashcards generated from text");

    Ok(Json(json!({
        "success": true,
        "flashcards": result.flashcards,
        "count": result.flashcards.len(),
        "source": "text",
        "metadata": {
            "provider": result.provider,
            "model": result.model,
            "degraded": result.degraded,
            "contentLength": content_chars,
        },
    })))
}

/// POST /generate-flashcards/pdf — multipart upload.
async fn generate_pdf(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult {
    let operation = "generate_pdf";
    log_api_start!(operation, source = "pdf");

    check_rate_limit(&state, &headers, operation)?;

    let upload = read_file_field(multipart)
        .await
        .map_err(|e| reject(e, &state, operation, "pdf"))?;

    if upload.mime_type != "application/pdf" {
        return Err(reject(
            ApiError::InvalidFileType(format!(
                "'{}' is not supported; only PDF files are allowed",
                upload.mime_type
            )),
            &state,
            operation,
            "pdf",
        ));
    }
    if upload.bytes.len() > state.limits.max_file_size {
        return Err(reject(
            ApiError::FileTooLarge {
                size: upload.bytes.len(),
                max: state.limits.max_file_size,
            },
            &state,
            operation,
            "pdf",
        ));
    }

    // Guard deletes the spooled upload on every exit path below.
    let _spooled = TempUpload::write(&state.upload_dir, &upload.file_name, &upload.bytes)
        .await
        .map_err(|e| reject(e, &state, operation, "pdf"))?;

    let extracted =
        pdf::extract_text(&upload.bytes).map_err(|e| reject(e, &state, operation, "pdf"))?;

    let result = state
        .deck_service
        .generate_deck(SourceType::Pdf, &extracted.text, &GenerationOptions::default())
        .await
        .map_err(|e| reject(e, &state, operation, "pdf"))?;

    log_api_success!(operation, count = result.flashcards.len(), "flashcards generated from PDF");

    Ok(Json(json!({
        "success": true,
        "flashcards": result.flashcards,
        "count": result.flashcards.len(),
        "source": "pdf",
        "metadata": {
            "provider": result.provider,
            "model": result.model,
            "degraded": result.degraded,
            "originalFile": upload.file_name,
            "fileSize": upload.bytes.len(),
            "pages": extracted.pages,
            "textLength": extracted.text.len(),
        },
    })))
}

/// POST /generate-flashcards/voice — multipart audio upload.
async fn generate_voice(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult {
    let operation = "generate_voice";
    log_api_start!(operation, source = "voice");

    check_rate_limit(&state, &headers, operation)?;

    let upload = read_audio_field(multipart)
        .await
        .map_err(|e| reject(e, &state, operation, "voice"))?;

    if !AUDIO_MIME_ALLOWLIST.contains(&upload.mime_type.as_str()) {
        return Err(reject(
            ApiError::InvalidFileType(format!(
                "'{}' is not supported; use WAV, MP3, MP4, M4A, WebM, or OGG audio",
                upload.mime_type
            )),
            &state,
            operation,
            "voice",
        ));
    }
    if upload.bytes.len() > state.limits.max_file_size {
        return Err(reject(
            ApiError::FileTooLarge {
                size: upload.bytes.len(),
                max: state.limits.max_file_size,
            },
            &state,
            operation,
            "voice",
        ));
    }

    let _spooled = TempUpload::write(&state.upload_dir, &upload.file_name, &upload.bytes)
        .await
        .map_err(|e| reject(e, &state, operation, "voice"))?;

    let transcription = state
        .transcription
        .transcribe(&upload)
        .await
        .map_err(|e| reject(e, &state, operation, "voice"))?;

    if transcription.placeholder {
        log_api_warn!(operation, "transcription degraded to placeholder transcript");
    }

    let preview: String = transcription.text.chars().take(200).collect();
    let transcription_length = transcription.text.len();

    let result = state
        .deck_service
        .generate_deck(SourceType::Voice, &transcription.text, &GenerationOptions::default())
        .await
        .map_err(|e| reject(e, &state, operation, "voice"))?;

    log_api_success!(operation, count = result.flashcards.len(), "flashcards generated from voice");

    Ok(Json(json!({
        "success": true,
        "flashcards": result.flashcards,
        "count": result.flashcards.len(),
        "source": "voice",
        "metadata": {
            "provider": result.provider,
            "model": result.model,
            "degraded": result.degraded,
            "transcriptionEngine": transcription.engine,
            "transcriptionLength": transcription_length,
            "transcriptionPreview": preview,
            "transcriptionPlaceholder": transcription.placeholder,
            "transcriptionTruncated": transcription.truncated,
        },
    })))
}

fn check_rate_limit(
    state: &AppState,
    headers: &HeaderMap,
    operation: &str,
) -> Result<(), (StatusCode, Json<ErrorEnvelope>)> {
    let key = client_key(headers);
    match state.rate_limiter.try_acquire(&key) {
        Ok(()) => Ok(()),
        Err(retry_after) => Err(reject(
            ApiError::RateLimitExceeded { retry_after },
            state,
            operation,
            "rate_limit",
        )),
    }
}

/// Client identity for rate limiting: first X-Forwarded-For hop when present,
/// otherwise a single shared bucket.
fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "global".to_string())
}

fn reject(
    err: ApiError,
    state: &AppState,
    operation: &str,
    source: &str,
) -> (StatusCode, Json<ErrorEnvelope>) {
    err.into_response_with_context(
        ErrorContext::new(operation).with_source(source),
        state.include_error_details,
    )
}

/// Pull the `file` field out of a multipart body.
async fn read_file_field(mut multipart: Multipart) -> Result<FileUpload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::MalformedRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field.content_type().unwrap_or("").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::MalformedRequest(e.to_string()))?;

        return Ok(FileUpload {
            file_name,
            mime_type,
            bytes: bytes.to_vec(),
        });
    }

    Err(ApiError::MissingFile)
}

/// Same as `read_file_field`, but an unreadable body is the one case the
/// voice endpoint classifies as `AudioFileUnreadable`.
async fn read_audio_field(multipart: Multipart) -> Result<FileUpload, ApiError> {
    match read_file_field(multipart).await {
        Ok(upload) => Ok(upload),
        Err(ApiError::MissingFile) => Err(ApiError::MissingFile),
        Err(ApiError::MalformedRequest(detail)) => Err(ApiError::AudioFileUnreadable(detail)),
        Err(other) => Err(other),
    }
}

/// Spooled copy of an upload; removed on drop so every handler exit path
/// releases the file.
struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    async fn write(dir: &Path, original_name: &str, bytes: &[u8]) -> Result<Self, ApiError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("creating upload dir: {}", e)))?;

        let sanitized: String = original_name
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' })
            .collect();
        let path = dir.join(format!("{}-{}", Uuid::new_v4(), sanitized));

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("spooling upload: {}", e)))?;

        Ok(Self { path })
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
