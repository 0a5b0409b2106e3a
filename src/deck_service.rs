use std::sync::Arc;

use tracing::{debug, info};

use crate::content::normalize_content;
use crate::enrichment::LinkEnricher;
use crate::errors::ApiError;
use crate::llm_providers::CompletionBackend;
use crate::models::{Flashcard, GenerationOptions, SourceType};
use crate::pipeline::normalize_response;
use crate::prompt::{build_prompt, SYSTEM_MESSAGE};

/// Outcome of one generation request, with the flags the HTTP layer folds
/// into response metadata.
#[derive(Debug, Clone)]
pub struct DeckResult {
    pub flashcards: Vec<Flashcard>,
    /// The provider response had no parseable structure and a synthesized
    /// fallback card was substituted.
    pub degraded: bool,
    /// The input content was truncated to the configured maximum.
    pub content_truncated: bool,
    pub provider: &'static str,
    pub model: String,
}

/// Orchestrates one generation request: normalize content, build the prompt,
/// call the completion provider, normalize its response, enrich.
pub struct DeckService {
    completion: Arc<dyn CompletionBackend>,
    enricher: Option<Arc<LinkEnricher>>,
    max_content_length: usize,
    max_flashcards: usize,
}

impl DeckService {
    pub fn new(
        completion: Arc<dyn CompletionBackend>,
        enricher: Option<Arc<LinkEnricher>>,
        max_content_length: usize,
        max_flashcards: usize,
    ) -> Self {
        Self {
            completion,
            enricher,
            max_content_length,
            max_flashcards,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.completion.provider_name()
    }

    pub async fn generate_deck(
        &self,
        source: SourceType,
        raw_content: &str,
        options: &GenerationOptions,
    ) -> Result<DeckResult, ApiError> {
        let content = normalize_content(source, raw_content, self.max_content_length)?;

        info!(
            source = source.as_str(),
            content_length = content.text.len(),
            content_truncated = content.truncated,
            provider = self.completion.provider_name(),
            model = %self.completion.model_name(),
            "Generating flashcard deck"
        );

        let prompt = build_prompt(&content.text, source, options);

        let raw_response = self.completion.complete(SYSTEM_MESSAGE, &prompt).await?;

        debug!(
            response_length = raw_response.len(),
            "Raw provider response received"
        );

        let batch = normalize_response(&raw_response, self.max_flashcards)?;

        let flashcards = match &self.enricher {
            Some(enricher) => enricher.enrich(batch.flashcards).await,
            None => batch.flashcards,
        };

        info!(
            source = source.as_str(),
            count = flashcards.len(),
            degraded = batch.degraded,
            "Flashcard deck generated"
        );

        Ok(DeckResult {
            flashcards,
            degraded: batch.degraded,
            content_truncated: content.truncated,
            provider: self.completion.provider_name(),
            model: self.completion.model_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_providers::ProviderError;
    use async_trait::async_trait;

    struct StubCompletion {
        response: Result<String, ProviderError>,
    }

    #[async_trait]
    impl CompletionBackend for StubCompletion {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(ProviderError::Timeout) => Err(ProviderError::Timeout),
                Err(other) => Err(ProviderError::Network(other.to_string())),
            }
        }

        fn provider_name(&self) -> &'static str {
            "Stub"
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }

    fn service(response: Result<String, ProviderError>) -> DeckService {
        DeckService::new(
            Arc::new(StubCompletion { response }),
            None,
            50_000,
            25,
        )
    }

    #[tokio::test]
    async fn valid_provider_json_yields_deck() {
        let raw = r#"[{"question": "Q?", "answer": "A.", "difficulty": "Easy"}]"#.to_string();
        let service = service(Ok(raw));

        let result = service
            .generate_deck(SourceType::Text, "cells divide", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(result.flashcards.len(), 1);
        assert!(!result.degraded);
        assert_eq!(result.provider, "Stub");
        assert_eq!(result.model, "stub-model");
    }

    #[tokio::test]
    async fn empty_content_is_rejected_before_the_provider() {
        let service = service(Ok("should never be called".to_string()));
        let err = service
            .generate_deck(SourceType::Text, "   ", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::EmptyContent));
    }

    #[tokio::test]
    async fn provider_timeout_surfaces_as_provider_timeout() {
        let service = service(Err(ProviderError::Timeout));
        let err = service
            .generate_deck(SourceType::Text, "content", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ProviderTimeout));
    }

    #[tokio::test]
    async fn garbage_response_degrades_to_fallback_card() {
        let service = service(Ok("no brackets or labels here at all".to_string()));
        let result = service
            .generate_deck(SourceType::Voice, "content", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(result.flashcards.len(), 1);
        assert!(result.degraded);
    }
}
