use std::collections::HashSet;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::models::{Difficulty, Flashcard, NormalizedBatch, RawCandidate};

/// How much of the raw provider text is embedded in the synthesized fallback
/// card when nothing could be parsed.
const FALLBACK_PREVIEW_CHARS: usize = 200;

/// Turn an untrusted provider response into a guaranteed-valid flashcard
/// batch, or fail with `NoFlashcardsGenerated` when even the fallback rules
/// leave nothing usable.
///
/// Stages, each attempted only when the previous yielded nothing:
/// 1. strict JSON-array parse (after stripping code fences and slicing the
///    outermost brackets),
/// 2. line-oriented "question: / answer:" extraction, with a single
///    synthesized card as the last resort,
/// 3. field validation and defaulting,
/// 4. cardinality cap.
pub fn normalize_response(raw: &str, max_flashcards: usize) -> Result<NormalizedBatch, ApiError> {
    let (candidates, degraded) = match parse_json_candidates(raw) {
        Some(parsed) => {
            debug!(candidate_count = parsed.len(), "Strict JSON parse succeeded");
            (parsed, false)
        }
        None => {
            let scanned = scan_lines(raw);
            if scanned.is_empty() {
                warn!(
                    response_length = raw.len(),
                    "Provider response had no parseable structure, synthesizing fallback card"
                );
                (vec![synthesize_fallback_candidate(raw)], true)
            } else {
                debug!(
                    candidate_count = scanned.len(),
                    "Line-oriented fallback extraction succeeded"
                );
                (scanned, false)
            }
        }
    };

    let flashcards = validate_candidates(candidates);

    let mut flashcards = flashcards;
    if flashcards.len() > max_flashcards {
        debug!(
            candidate_count = flashcards.len(),
            cap = max_flashcards,
            "Capping flashcard batch"
        );
        flashcards.truncate(max_flashcards);
    }

    if flashcards.is_empty() {
        return Err(ApiError::NoFlashcardsGenerated);
    }

    Ok(NormalizedBatch { flashcards, degraded })
}

/// Stage 1: strict parse. Returns None when the text does not contain a
/// parseable JSON array.
fn parse_json_candidates(raw: &str) -> Option<Vec<RawCandidate>> {
    let cleaned = strip_code_fences(raw);

    let start = cleaned.find('[')?;
    let end = cleaned.rfind(']')?;
    if end <= start {
        return None;
    }

    let sliced = &cleaned[start..=end];
    let parsed: Value = serde_json::from_str(sliced).ok()?;
    let array = parsed.as_array()?;

    Some(
        array
            .iter()
            .map(|element| {
                serde_json::from_value::<RawCandidate>(element.clone())
                    .unwrap_or_default()
            })
            .collect(),
    )
}

/// Strip Markdown code-fence wrappers (```json ... ``` or ``` ... ```).
fn strip_code_fences(raw: &str) -> String {
    if let Some(start) = raw.find("```json") {
        if let Some(end) = raw[start + 7..].find("```") {
            return raw[start + 7..start + 7 + end].trim().to_string();
        }
    }

    if let Some(start) = raw.find("```") {
        if let Some(end) = raw[start + 3..].find("```") {
            return raw[start + 3..start + 3 + end].trim().to_string();
        }
    }

    raw.trim().to_string()
}

/// Stage 2: tolerant line-oriented extraction for responses that abandoned
/// the JSON contract but still read like "Question: ... / Answer: ...".
fn scan_lines(raw: &str) -> Vec<RawCandidate> {
    let mut cards = Vec::new();
    let mut question: Option<String> = None;
    let mut answer: Option<String> = None;
    let mut difficulty: Option<String> = None;

    for line in raw.lines() {
        let lower = line.to_lowercase();

        if let Some(text) = labeled_value(line, &lower, "question") {
            // A new question closes out the previous card when it is complete;
            // an incomplete one is discarded.
            if question.is_some() && answer.is_some() {
                cards.push(RawCandidate::from_text(
                    question.take(),
                    answer.take(),
                    difficulty.take(),
                ));
            }
            question = Some(text);
            answer = None;
            difficulty = None;
        } else if let Some(text) = labeled_value(line, &lower, "answer") {
            answer = Some(text);
        } else if lower.contains("difficulty") {
            difficulty = Some(extract_difficulty_token(&lower));
        }
    }

    if question.is_some() && answer.is_some() {
        cards.push(RawCandidate::from_text(question, answer, difficulty));
    }

    cards
}

/// Extract the value after the first colon on a line containing `label`
/// before that colon. Tolerates any casing and stray JSON punctuation.
fn labeled_value(line: &str, lower: &str, label: &str) -> Option<String> {
    let label_pos = lower.find(label)?;
    let colon_pos = lower[label_pos..].find(':')? + label_pos;

    let value = line[colon_pos + 1..]
        .trim()
        .trim_end_matches(',')
        .trim()
        .trim_matches('"')
        .trim()
        .to_string();

    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// The difficulty token that appears earliest in the line wins, so
/// "hard, not easy" reads as hard.
fn extract_difficulty_token(lower_line: &str) -> String {
    ["easy", "medium", "hard"]
        .iter()
        .filter_map(|token| lower_line.find(token).map(|pos| (pos, *token)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, token)| token.to_string())
        .unwrap_or_else(|| "medium".to_string())
}

/// Last resort: exactly one card carrying a truncated preview of the raw
/// text so the client still gets something to show.
fn synthesize_fallback_candidate(raw: &str) -> RawCandidate {
    let preview = truncate_preview(raw.trim(), FALLBACK_PREVIEW_CHARS);
    RawCandidate::from_text(
        Some("What is the main topic of the provided content?".to_string()),
        Some(format!(
            "The AI response could not be parsed into flashcards. Response preview: {}",
            preview
        )),
        Some("medium".to_string()),
    )
}

fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Stage 3: total validation from candidate to flashcard. Only a record with
/// neither question nor answer is rejected; everything else is defaulted
/// into validity.
fn validate_candidates(candidates: Vec<RawCandidate>) -> Vec<Flashcard> {
    let batch_epoch_ms = Utc::now().timestamp_millis();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut flashcards = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.into_iter().enumerate() {
        let position = flashcards.len() + 1;

        let question = scalar_to_text(candidate.question.as_ref());
        let answer = scalar_to_text(candidate.answer.as_ref());

        if question.is_none() && answer.is_none() {
            debug!(index, "Dropping candidate with neither question nor answer");
            continue;
        }

        let id = candidate
            .id
            .as_ref()
            .and_then(|v| scalar_to_text(Some(v)))
            .filter(|id| seen_ids.insert(id.clone()))
            .unwrap_or_else(|| {
                let synthesized = format!("{}-{}", batch_epoch_ms, index);
                seen_ids.insert(synthesized.clone());
                synthesized
            });

        let difficulty = Difficulty::coerce(
            candidate
                .difficulty
                .as_ref()
                .and_then(|v| v.as_str())
                .map(str::trim),
        );

        flashcards.push(Flashcard {
            id,
            question: question.unwrap_or_else(|| format!("Question {}", position)),
            answer: answer.unwrap_or_else(|| format!("Answer {}", position)),
            difficulty,
            related_links: None,
        });
    }

    flashcards
}

/// Coerce a JSON scalar into trimmed non-empty text.
fn scalar_to_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
