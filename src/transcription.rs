use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{multipart, Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::TranscriptionConfig;
use crate::content::truncate_chars;
use crate::errors::ApiError;
use crate::models::{FileUpload, TranscriptionOutcome};
use crate::rate_limit::{Clock, SlidingWindowLimiter};

/// Assumed audio bitrate used to estimate duration for the placeholder
/// transcript (16 KiB per second of audio).
const ASSUMED_BYTES_PER_SECOND: u64 = 16 * 1024;

/// Classified failure of a transcription backend attempt. Every class moves
/// the chain to the next backend; `PayloadRejected` is additionally recorded
/// as the hard cause should nothing succeed.
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    #[error("backend rejected credentials")]
    AuthInvalid,

    #[error("backend rate limited the request")]
    RateLimited,

    #[error("backend rejected the audio payload: {0}")]
    PayloadRejected(String),

    #[error("backend timed out")]
    Timeout,

    #[error("transcript contained no speech")]
    NoSpeechDetected,

    #[error("network failure: {0}")]
    Network(String),
}

fn classify_transport_error(err: reqwest::Error) -> TranscribeError {
    if err.is_timeout() {
        TranscribeError::Timeout
    } else {
        TranscribeError::Network(err.to_string())
    }
}

fn classify_status(status: StatusCode, detail: String) -> TranscribeError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => TranscribeError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TranscribeError::AuthInvalid,
        StatusCode::BAD_REQUEST
        | StatusCode::PAYLOAD_TOO_LARGE
        | StatusCode::UNSUPPORTED_MEDIA_TYPE
        | StatusCode::UNPROCESSABLE_ENTITY => TranscribeError::PayloadRejected(detail),
        _ => TranscribeError::Network(format!("{}: {}", status, detail)),
    }
}

/// A speech-to-text backend behind a uniform contract.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(&self, upload: &FileUpload) -> Result<String, TranscribeError>;
}

/// OpenAI Whisper hosted transcription.
pub struct OpenAiWhisperBackend {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiWhisperBackend {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        }
    }
}

#[async_trait]
impl TranscriptionBackend for OpenAiWhisperBackend {
    fn name(&self) -> &'static str {
        "openai-whisper"
    }

    async fn transcribe(&self, upload: &FileUpload) -> Result<String, TranscribeError> {
        let part = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| TranscribeError::PayloadRejected(e.to_string()))?;

        let form = multipart::Form::new()
            .text("model", "whisper-1")
            .text("response_format", "text")
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, detail));
        }

        response.text().await.map_err(classify_transport_error)
    }
}

/// Groq hosted Whisper transcription.
pub struct GroqWhisperBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GroqTranscriptionResponse {
    text: String,
}

impl GroqWhisperBackend {
    pub fn new(api_key: String, base_url: Option<String>, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.groq.com/openai/v1".to_string()),
            model: "whisper-large-v3-turbo".to_string(),
        }
    }
}

#[async_trait]
impl TranscriptionBackend for GroqWhisperBackend {
    fn name(&self) -> &'static str {
        "groq-whisper"
    }

    async fn transcribe(&self, upload: &FileUpload) -> Result<String, TranscribeError> {
        let part = multipart::Part::bytes(upload.bytes.clone())
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)
            .map_err(|e| TranscribeError::PayloadRejected(e.to_string()))?;

        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", part);

        let response = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_status(status, detail));
        }

        let parsed: GroqTranscriptionResponse = response
            .json()
            .await
            .map_err(|e| TranscribeError::Network(e.to_string()))?;

        Ok(parsed.text)
    }
}

struct ChainEntry {
    backend: Arc<dyn TranscriptionBackend>,
    limiter: SlidingWindowLimiter,
}

/// Ordered transcription backend chain with independent per-backend request
/// budgets. Degrades to a synthesized placeholder transcript instead of
/// failing, so downstream always has text to work with.
pub struct TranscriptionChain {
    entries: Vec<ChainEntry>,
    max_content_length: usize,
}

impl TranscriptionChain {
    pub fn new(
        backends: Vec<Arc<dyn TranscriptionBackend>>,
        per_backend_limit: usize,
        per_backend_window: Duration,
        max_content_length: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let entries = backends
            .into_iter()
            .map(|backend| ChainEntry {
                limiter: SlidingWindowLimiter::new(
                    per_backend_limit,
                    per_backend_window,
                    clock.clone(),
                ),
                backend,
            })
            .collect();

        Self {
            entries,
            max_content_length,
        }
    }

    /// Build the reference chain from configuration: OpenAI Whisper first,
    /// Groq Whisper second. Backends without a configured key are omitted.
    pub fn from_config(
        config: &TranscriptionConfig,
        max_content_length: usize,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let timeout = Duration::from_secs(60);
        let mut backends: Vec<Arc<dyn TranscriptionBackend>> = Vec::new();

        if let Some(key) = &config.openai_api_key {
            backends.push(Arc::new(OpenAiWhisperBackend::new(key.clone(), None, timeout)));
        }
        if let Some(key) = &config.groq_api_key {
            backends.push(Arc::new(GroqWhisperBackend::new(key.clone(), None, timeout)));
        }

        Self::new(
            backends,
            config.per_backend_limit,
            Duration::from_secs(config.per_backend_window_secs),
            max_content_length,
            clock,
        )
    }

    /// Run the chain. Never fails with a backend error: exhausting every
    /// backend yields the placeholder transcript. The one hard failure is a
    /// structural payload rejection with no succeeding backend.
    pub async fn transcribe(&self, upload: &FileUpload) -> Result<TranscriptionOutcome, ApiError> {
        let mut payload_rejection: Option<String> = None;

        for entry in &self.entries {
            let backend = &entry.backend;

            // One bounded wait on an exhausted window, then move on.
            if let Err(wait) = entry.limiter.try_acquire() {
                debug!(
                    backend = backend.name(),
                    wait_ms = wait.as_millis() as u64,
                    "Backend request window exhausted, waiting once"
                );
                tokio::time::sleep(wait).await;
                if entry.limiter.try_acquire().is_err() {
                    warn!(
                        backend = backend.name(),
                        "Backend window still exhausted after wait, trying next backend"
                    );
                    continue;
                }
            }

            crate::log_provider_event!(start, "transcription", backend = backend.name());

            match backend.transcribe(upload).await {
                Ok(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        crate::log_provider_event!(
                            failure,
                            "transcription",
                            backend = backend.name(),
                            error = TranscribeError::NoSpeechDetected
                        );
                        continue;
                    }

                    let truncated = trimmed.chars().count() > self.max_content_length;
                    let text = if truncated {
                        truncate_chars(trimmed, self.max_content_length)
                    } else {
                        trimmed.to_string()
                    };

                    crate::log_provider_event!(
                        success,
                        "transcription",
                        backend = backend.name(),
                        format!("{} characters transcribed", text.len())
                    );

                    return Ok(TranscriptionOutcome {
                        text,
                        engine: backend.name().to_string(),
                        truncated,
                        placeholder: false,
                    });
                }
                Err(err) => {
                    crate::log_provider_event!(
                        failure,
                        "transcription",
                        backend = backend.name(),
                        error = err
                    );
                    if let TranscribeError::PayloadRejected(detail) = err {
                        payload_rejection = Some(detail);
                    }
                }
            }
        }

        if let Some(detail) = payload_rejection {
            return Err(ApiError::InvalidFileType(format!(
                "audio payload rejected by transcription backends: {}",
                detail
            )));
        }

        info!(
            file_name = %upload.file_name,
            "All transcription backends unavailable, synthesizing placeholder transcript"
        );
        Ok(self.placeholder_outcome(upload))
    }

    fn placeholder_outcome(&self, upload: &FileUpload) -> TranscriptionOutcome {
        let estimated_secs = (upload.bytes.len() as u64 / ASSUMED_BYTES_PER_SECOND).max(1);

        let text = format!(
            "Audio transcription was not available for this recording.\n\
             File: {}\n\
             Estimated duration: about {} seconds\n\
             To get flashcards for this material, transcribe the recording manually \
             and resubmit it as text input.",
            upload.file_name, estimated_secs
        );

        TranscriptionOutcome {
            text,
            engine: "placeholder".to_string(),
            truncated: false,
            placeholder: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::test_support::FakeClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        name: &'static str,
        results: Vec<Result<String, TranscribeError>>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn new(name: &'static str, results: Vec<Result<String, TranscribeError>>) -> Self {
            Self {
                name,
                results,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TranscriptionBackend for StubBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn transcribe(&self, _upload: &FileUpload) -> Result<String, TranscribeError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            match self.results.get(call.min(self.results.len() - 1)).unwrap() {
                Ok(text) => Ok(text.clone()),
                Err(TranscribeError::AuthInvalid) => Err(TranscribeError::AuthInvalid),
                Err(TranscribeError::RateLimited) => Err(TranscribeError::RateLimited),
                Err(TranscribeError::Timeout) => Err(TranscribeError::Timeout),
                Err(TranscribeError::NoSpeechDetected) => Err(TranscribeError::NoSpeechDetected),
                Err(TranscribeError::PayloadRejected(d)) => {
                    Err(TranscribeError::PayloadRejected(d.clone()))
                }
                Err(TranscribeError::Network(d)) => Err(TranscribeError::Network(d.clone())),
            }
        }
    }

    fn upload() -> FileUpload {
        FileUpload {
            file_name: "lecture.mp3".to_string(),
            mime_type: "audio/mpeg".to_string(),
            bytes: vec![0u8; 64 * 1024],
        }
    }

    fn chain(backends: Vec<Arc<dyn TranscriptionBackend>>) -> TranscriptionChain {
        TranscriptionChain::new(
            backends,
            50,
            Duration::from_secs(60),
            50_000,
            Arc::new(FakeClock::new()),
        )
    }

    #[tokio::test]
    async fn first_backend_success_short_circuits() {
        let a = Arc::new(StubBackend::new("a", vec![Ok("transcript from a".to_string())]));
        let b = Arc::new(StubBackend::new("b", vec![Ok("transcript from b".to_string())]));
        let chain = chain(vec![a.clone(), b.clone()]);

        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert_eq!(outcome.text, "transcript from a");
        assert_eq!(outcome.engine, "a");
        assert!(!outcome.placeholder);
        assert_eq!(b.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rate_limited_backend_falls_over_to_next() {
        let a = Arc::new(StubBackend::new("a", vec![Err(TranscribeError::RateLimited)]));
        let b = Arc::new(StubBackend::new("b", vec![Ok("transcript from b".to_string())]));
        let chain = chain(vec![a, b]);

        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert_eq!(outcome.text, "transcript from b");
        assert_eq!(outcome.engine, "b");
    }

    #[tokio::test]
    async fn blank_transcript_counts_as_failure() {
        let a = Arc::new(StubBackend::new("a", vec![Ok("   \n ".to_string())]));
        let b = Arc::new(StubBackend::new("b", vec![Ok("real words".to_string())]));
        let chain = chain(vec![a, b]);

        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert_eq!(outcome.engine, "b");
    }

    #[tokio::test]
    async fn all_backends_failing_yields_placeholder_with_filename() {
        let a = Arc::new(StubBackend::new("a", vec![Err(TranscribeError::AuthInvalid)]));
        let b = Arc::new(StubBackend::new("b", vec![Err(TranscribeError::Timeout)]));
        let chain = chain(vec![a, b]);

        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert!(outcome.placeholder);
        assert_eq!(outcome.engine, "placeholder");
        assert!(outcome.text.contains("lecture.mp3"));
        assert!(outcome.text.contains("transcribe the recording manually"));
    }

    #[tokio::test]
    async fn empty_chain_yields_placeholder() {
        let chain = chain(vec![]);
        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert!(outcome.placeholder);
    }

    #[tokio::test]
    async fn payload_rejection_with_no_success_is_hard_error() {
        let a = Arc::new(StubBackend::new(
            "a",
            vec![Err(TranscribeError::PayloadRejected("corrupt container".to_string()))],
        ));
        let b = Arc::new(StubBackend::new("b", vec![Err(TranscribeError::Timeout)]));
        let chain = chain(vec![a, b]);

        let err = chain.transcribe(&upload()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidFileType(_)));
    }

    #[tokio::test]
    async fn payload_rejection_is_forgiven_when_a_later_backend_succeeds() {
        let a = Arc::new(StubBackend::new(
            "a",
            vec![Err(TranscribeError::PayloadRejected("bad".to_string()))],
        ));
        let b = Arc::new(StubBackend::new("b", vec![Ok("recovered".to_string())]));
        let chain = chain(vec![a, b]);

        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert_eq!(outcome.text, "recovered");
    }

    #[tokio::test]
    async fn oversize_transcript_is_truncated_and_flagged() {
        let long = "w".repeat(60_000);
        let a = Arc::new(StubBackend::new("a", vec![Ok(long)]));
        let chain = TranscriptionChain::new(
            vec![a],
            50,
            Duration::from_secs(60),
            50_000,
            Arc::new(FakeClock::new()),
        );

        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert!(outcome.truncated);
        assert_eq!(outcome.text.len(), 50_000);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_window_moves_to_next_backend_after_one_wait() {
        let clock = Arc::new(FakeClock::new());
        let a = Arc::new(StubBackend::new("a", vec![Ok("from a".to_string())]));
        let b = Arc::new(StubBackend::new("b", vec![Ok("from b".to_string())]));
        let chain = TranscriptionChain::new(
            vec![a.clone(), b],
            1,
            Duration::from_secs(60),
            50_000,
            clock.clone(),
        );

        // First call consumes backend a's single slot.
        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert_eq!(outcome.engine, "a");

        // The fake clock never advances, so a's window stays exhausted even
        // after the single (paused-time) wait; the chain must move to b.
        let outcome = chain.transcribe(&upload()).await.unwrap();
        assert_eq!(outcome.engine, "b");
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }
}
