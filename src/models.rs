use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed difficulty scale for generated flashcards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    /// Coerce an arbitrary upstream value into the closed set.
    /// Anything unrecognized (including missing/null) becomes Medium.
    pub fn coerce(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "easy" => Difficulty::Easy,
            Some(v) if v == "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

/// A validated flashcard, the only shape ever returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub difficulty: Difficulty,
    #[serde(rename = "relatedLinks", skip_serializing_if = "Option::is_none")]
    pub related_links: Option<Vec<RelatedLink>>,
}

/// Search result attached to a flashcard by the enrichment decorator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedLink {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Unvalidated parse product of the provider response. Field presence is
/// entirely untrusted; ids and text fields may arrive as any JSON scalar.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCandidate {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub question: Option<Value>,
    #[serde(default)]
    pub answer: Option<Value>,
    #[serde(default)]
    pub difficulty: Option<Value>,
}

impl RawCandidate {
    pub fn from_text(
        question: Option<String>,
        answer: Option<String>,
        difficulty: Option<String>,
    ) -> Self {
        Self {
            id: None,
            question: question.map(Value::String),
            answer: answer.map(Value::String),
            difficulty: difficulty.map(Value::String),
        }
    }
}

/// Where the study material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Pdf,
    Voice,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Pdf => "pdf",
            SourceType::Voice => "voice",
        }
    }
}

/// Optional generation knobs forwarded from the client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationOptions {
    pub tone: Option<String>,
    pub quantity: Option<String>,
    pub level: Option<String>,
}

/// Result of content normalization.
#[derive(Debug, Clone)]
pub struct NormalizedContent {
    pub text: String,
    pub truncated: bool,
}

/// Result of the response normalization pipeline.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub flashcards: Vec<Flashcard>,
    /// True when the structured parse failed entirely and a synthesized
    /// fallback card was substituted.
    pub degraded: bool,
}

/// What the transcription chain handed back. The chain never fails; a
/// placeholder outcome is still valid downstream input.
#[derive(Debug, Clone)]
pub struct TranscriptionOutcome {
    pub text: String,
    pub engine: String,
    pub truncated: bool,
    pub placeholder: bool,
}

/// In-memory multipart upload, PDF or audio.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}
