use crate::errors::ApiError;
use crate::models::{NormalizedContent, SourceType};

/// Normalize one of the three input modalities into a bounded text payload
/// ready for prompting. Pure transform, no I/O. The limit is measured in
/// characters, not bytes, so multibyte scripts get the full budget.
///
/// Characters outside printable ASCII plus ordinary whitespace are stripped.
/// PDF text over the limit is rejected with `ContentTooLarge` (the client
/// should upload a smaller document); text and voice payloads are truncated
/// instead, since the caller already committed the content.
pub fn normalize_content(
    source: SourceType,
    raw: &str,
    max_chars: usize,
) -> Result<NormalizedContent, ApiError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| is_safe_char(*c))
        .collect::<String>()
        .trim()
        .to_string();

    if cleaned.is_empty() {
        return Err(ApiError::EmptyContent);
    }

    let char_count = cleaned.chars().count();
    if char_count > max_chars {
        if source == SourceType::Pdf {
            return Err(ApiError::ContentTooLarge {
                length: char_count,
                max: max_chars,
            });
        }
        return Ok(NormalizedContent {
            text: truncate_chars(&cleaned, max_chars),
            truncated: true,
        });
    }

    Ok(NormalizedContent {
        text: cleaned,
        truncated: false,
    })
}

fn is_safe_char(c: char) -> bool {
    matches!(c, ' '..='~' | '\n' | '\r' | '\t') || (!c.is_control() && !c.is_ascii())
}

/// Truncate to at most `max_chars` characters.
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => s[..byte_index].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_clean_text_through() {
        let result = normalize_content(SourceType::Text, "Mitochondria are the powerhouse.", 50_000).unwrap();
        assert_eq!(result.text, "Mitochondria are the powerhouse.");
        assert!(!result.truncated);
    }

    #[test]
    fn strips_control_characters() {
        let result = normalize_content(SourceType::Text, "a\u{0000}b\u{0007}c\nd", 50_000).unwrap();
        assert_eq!(result.text, "abc\nd");
    }

    #[test]
    fn keeps_non_ascii_printables() {
        let result = normalize_content(SourceType::Text, "café 日本語", 50_000).unwrap();
        assert_eq!(result.text, "café 日本語");
    }

    #[test]
    fn empty_after_cleaning_is_rejected() {
        let err = normalize_content(SourceType::Text, "\u{0000}\u{0001}  ", 50_000).unwrap_err();
        assert!(matches!(err, ApiError::EmptyContent));
    }

    #[test]
    fn oversize_pdf_is_rejected() {
        let big = "x".repeat(60_000);
        let err = normalize_content(SourceType::Pdf, &big, 50_000).unwrap_err();
        assert!(matches!(err, ApiError::ContentTooLarge { length: 60_000, max: 50_000 }));
    }

    #[test]
    fn oversize_text_is_truncated_and_flagged() {
        let big = "x".repeat(60_000);
        let result = normalize_content(SourceType::Text, &big, 50_000).unwrap();
        assert_eq!(result.text.chars().count(), 50_000);
        assert!(result.truncated);
    }

    #[test]
    fn limit_is_measured_in_characters_not_bytes() {
        // 40k three-byte characters is 120k bytes but well under a 50k
        // character limit.
        let multibyte = "あ".repeat(40_000);
        let result = normalize_content(SourceType::Text, &multibyte, 50_000).unwrap();
        assert!(!result.truncated);
        assert_eq!(result.text.chars().count(), 40_000);

        let over = "あ".repeat(60_000);
        let result = normalize_content(SourceType::Text, &over, 50_000).unwrap();
        assert!(result.truncated);
        assert_eq!(result.text.chars().count(), 50_000);
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate_chars("é", 1), "é");
        assert_eq!(truncate_chars("abé", 2), "ab");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
