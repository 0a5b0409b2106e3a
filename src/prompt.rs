use crate::models::{GenerationOptions, SourceType};

/// System message sent alongside every generation prompt.
pub const SYSTEM_MESSAGE: &str =
    "You are a study assistant that creates flashcards. Always respond with only a valid JSON array in the requested format, with no extra text.";

/// Render the fixed instruction template plus the normalized content and
/// generation options into the prompt for the completion provider.
/// Deterministic; output length is bounded by the content length plus a
/// constant instruction overhead.
pub fn build_prompt(content: &str, source: SourceType, options: &GenerationOptions) -> String {
    let quantity = options.quantity.as_deref().unwrap_or("5-7");

    let mut prompt = format!(
        "Generate {} flashcards from this content. Return ONLY a valid JSON array with no extra text.\n\
         Each flashcard must have this exact format: {{\"id\": 1, \"question\": \"...\", \"answer\": \"...\", \"difficulty\": \"Easy\"}}\n\
         Choose difficulty as Easy, Medium, or Hard based on concept complexity.\n\
         Focus on the key points, concepts, and facts mentioned.\n",
        quantity
    );

    if let Some(tone) = options.tone.as_deref() {
        prompt.push_str(&format!("Write the questions and answers in a {} tone.\n", tone));
    }
    if let Some(level) = options.level.as_deref() {
        prompt.push_str(&format!("Target the material at a {} audience.\n", level));
    }

    let content_label = match source {
        SourceType::Text => "Content",
        SourceType::Pdf => "Document Content",
        SourceType::Voice => "Transcribed Content",
    };
    prompt.push_str(&format!("{}: {}", content_label, content));

    prompt
}
