use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};

/// Centralized error taxonomy for the flashcard service. Every failure that
/// can surface at the HTTP boundary is classified into one of these before it
/// leaves the component that observed it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Input errors: the client's fault, never retried.
    #[error("Content is empty")]
    EmptyContent,

    #[error("Content is too long: {length} characters exceeds the {max} character limit")]
    ContentTooLarge { length: usize, max: usize },

    #[error("Unsupported file type: {0}")]
    InvalidFileType(String),

    #[error("File is too large: {size} bytes exceeds the {max} byte limit")]
    FileTooLarge { size: usize, max: usize },

    #[error("No file was uploaded")]
    MissingFile,

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    // Provider errors: the upstream dependency's fault, surfaced only once
    // internal fallbacks are exhausted.
    #[error("AI provider timed out")]
    ProviderTimeout,

    #[error("AI provider rate limited the request")]
    ProviderRateLimited,

    #[error("AI provider rejected the configured credentials")]
    ProviderAuthFailed,

    #[error("AI provider request failed: {0}")]
    ProviderError(String),

    #[error("No flashcards could be generated from the provider response")]
    NoFlashcardsGenerated,

    #[error("Audio file could not be read: {0}")]
    AudioFileUnreadable(String),

    #[error("PDF text extraction failed: {0}")]
    PdfExtraction(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error envelope returned for every 4xx/5xx response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    pub timestamp: String,
}

/// Context attached to an error when it is mapped at the HTTP boundary,
/// used for structured logging only.
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}

impl ApiError {
    /// Short machine-readable code for the envelope's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::EmptyContent => "empty_content",
            ApiError::ContentTooLarge { .. } => "content_too_long",
            ApiError::InvalidFileType(_) => "invalid_file_type",
            ApiError::FileTooLarge { .. } => "file_too_large",
            ApiError::MissingFile => "missing_file",
            ApiError::MalformedRequest(_) => "malformed_request",
            ApiError::RateLimitExceeded { .. } => "rate_limit_exceeded",
            ApiError::ProviderTimeout => "provider_timeout",
            ApiError::ProviderRateLimited => "provider_rate_limited",
            ApiError::ProviderAuthFailed => "provider_auth_failed",
            ApiError::ProviderError(_) => "provider_error",
            ApiError::NoFlashcardsGenerated => "no_flashcards_generated",
            ApiError::AudioFileUnreadable(_) => "audio_file_unreadable",
            ApiError::PdfExtraction(_) => "pdf_extraction_failed",
            ApiError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::EmptyContent
            | ApiError::ContentTooLarge { .. }
            | ApiError::InvalidFileType(_)
            | ApiError::FileTooLarge { .. }
            | ApiError::MissingFile
            | ApiError::MalformedRequest(_)
            | ApiError::AudioFileUnreadable(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// User-facing message. Provider failures get actionable guidance that
    /// distinguishes timeout / rate limit / misconfiguration.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::ProviderTimeout => {
                "The AI service took too long to respond. Try again with shorter content.".to_string()
            }
            ApiError::ProviderRateLimited => {
                "The AI service is rate limiting requests. Wait a moment and retry.".to_string()
            }
            ApiError::ProviderAuthFailed => {
                "The AI service rejected the server's credentials. This is a configuration problem, not something you can fix by retrying.".to_string()
            }
            ApiError::ProviderError(_) | ApiError::Internal(_) => {
                "Failed to generate flashcards. Please try again.".to_string()
            }
            ApiError::NoFlashcardsGenerated => {
                "The AI response could not be turned into flashcards. Try again or rephrase the content.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Map the error to its HTTP response. `include_details` is true only in
    /// development mode; production responses never leak internal detail.
    pub fn into_response_with_context(
        self,
        context: ErrorContext,
        include_details: bool,
    ) -> (StatusCode, Json<ErrorEnvelope>) {
        let status = self.status();

        if status.is_server_error() {
            error!(
                operation = %context.operation,
                source = ?context.source,
                error_code = self.code(),
                error = %self,
                "Request failed"
            );
        } else {
            warn!(
                operation = %context.operation,
                source = ?context.source,
                error_code = self.code(),
                error = %self,
                "Request rejected"
            );
        }

        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        };

        let envelope = ErrorEnvelope {
            error: self.code().to_string(),
            message: self.user_message(),
            details: if include_details {
                Some(self.to_string())
            } else {
                None
            },
            retry_after,
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(envelope))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_map_to_400() {
        assert_eq!(ApiError::EmptyContent.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::ContentTooLarge { length: 60_000, max: 50_000 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InvalidFileType("text/plain".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn rate_limit_maps_to_429_with_hint() {
        let err = ApiError::RateLimitExceeded { retry_after: 120 };
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);

        let (_, Json(envelope)) =
            err.into_response_with_context(ErrorContext::new("generate_text"), false);
        assert_eq!(envelope.retry_after, Some(120));
        assert_eq!(envelope.error, "rate_limit_exceeded");
    }

    #[test]
    fn provider_errors_map_to_500() {
        assert_eq!(ApiError::ProviderTimeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ApiError::NoFlashcardsGenerated.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn provider_messages_distinguish_failure_modes() {
        assert!(ApiError::ProviderTimeout.user_message().contains("shorter content"));
        assert!(ApiError::ProviderRateLimited.user_message().contains("retry"));
        assert!(ApiError::ProviderAuthFailed.user_message().contains("configuration"));
    }

    #[test]
    fn details_only_included_when_requested() {
        let (_, Json(dev)) = ApiError::ProviderError("upstream 503".to_string())
            .into_response_with_context(ErrorContext::new("generate_text"), true);
        assert!(dev.details.as_deref().unwrap_or("").contains("503"));

        let (_, Json(prod)) = ApiError::ProviderError("upstream 503".to_string())
            .into_response_with_context(ErrorContext::new("generate_text"), false);
        assert!(prod.details.is_none());
    }

    #[test]
    fn content_too_large_names_the_constraint() {
        let err = ApiError::ContentTooLarge { length: 60_000, max: 50_000 };
        assert!(err.to_string().contains("too long"));
        assert!(err.to_string().contains("50000"));
    }
}
