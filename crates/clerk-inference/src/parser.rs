//! Recovery of task candidates from raw model output.
//!
//! Models wrap their JSON in markdown fences, prefix it with prose, or emit
//! half-valid arrays. The parser narrows the text down to the outermost
//! bracket pair and decodes each element on its own: elements that fail to
//! decode are skipped, and the batch only fails when nothing usable remains.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use clerk_core::{Error, Result, TaskCandidate};

/// First fenced code block, optionally tagged `json`.
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[ \t]*(?:json|JSON)?[ \t]*\r?\n?(.*?)```")
        .expect("fenced block pattern is valid")
});

/// Turns a backend's text answer into task candidates.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseParser;

impl ResponseParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, raw: &str) -> Result<Vec<TaskCandidate>> {
        parse_response(raw)
    }
}

/// Parse a raw model answer into candidates.
///
/// Fails with [`Error::MalformedExtraction`] when no bracket pair is found,
/// the bracketed slice is not a JSON array, or no element decodes.
pub fn parse_response(raw: &str) -> Result<Vec<TaskCandidate>> {
    let text = raw.trim();
    let body = FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(text);

    let slice = bracketed_slice(body).ok_or_else(|| {
        Error::MalformedExtraction("no JSON array found in response".to_string())
    })?;

    let elements: Vec<JsonValue> = serde_json::from_str(slice)
        .map_err(|e| Error::MalformedExtraction(format!("invalid JSON array: {}", e)))?;

    let total = elements.len();
    let mut candidates = Vec::with_capacity(total);
    for (index, element) in elements.into_iter().enumerate() {
        match serde_json::from_value::<TaskCandidate>(element) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => warn!(index, error = %e, "Skipping undecodable task element"),
        }
    }

    if candidates.is_empty() {
        return Err(Error::MalformedExtraction(format!(
            "none of {} array elements decoded as a task",
            total
        )));
    }

    debug!(
        candidate_count = candidates.len(),
        skipped = total - candidates.len(),
        "Parsed extraction response"
    );
    Ok(candidates)
}

/// Slice from the first `[` to the last `]`, inclusive.
fn bracketed_slice(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use clerk_core::TaskPriority;

    const AWS_ARRAY: &str =
        r#"[{"title":"Meeting with AWS","priority":"HIGH","category":"Meeting","tags":["aws"]}]"#;

    #[test]
    fn test_parse_plain_array() {
        let candidates = parse_response(AWS_ARRAY).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Meeting with AWS");
        assert_eq!(candidates[0].priority, TaskPriority::High);
        assert_eq!(candidates[0].category, "Meeting");
        assert_eq!(candidates[0].tags, vec!["aws"]);
    }

    #[test]
    fn test_fenced_block_parses_like_unwrapped() {
        let fenced = format!("```json\n{}\n```", AWS_ARRAY);
        assert_eq!(parse_response(&fenced).unwrap(), parse_response(AWS_ARRAY).unwrap());

        let untagged = format!("```\n{}\n```", AWS_ARRAY);
        assert_eq!(parse_response(&untagged).unwrap(), parse_response(AWS_ARRAY).unwrap());
    }

    #[test]
    fn test_fenced_block_ignores_surrounding_prose() {
        let raw = format!(
            "Sure! Here are the tasks [as requested]:\n```json\n{}\n```\nLet me know [anything].",
            AWS_ARRAY
        );
        let candidates = parse_response(&raw).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Meeting with AWS");
    }

    #[test]
    fn test_prose_wrapped_array() {
        let raw = format!("I found these tasks: {} Hope that helps.", AWS_ARRAY);
        assert_eq!(parse_response(&raw).unwrap().len(), 1);
    }

    #[test]
    fn test_multiple_candidates_keep_order() {
        let raw = r#"[{"title":"First"},{"title":"Second","tags":[]},{"title":"Third"}]"#;
        let titles: Vec<String> = parse_response(raw)
            .unwrap()
            .into_iter()
            .map(|c| c.title)
            .collect();
        assert_eq!(titles, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_no_brackets_is_malformed() {
        let err = parse_response("I could not find any tasks.").unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    #[test]
    fn test_reversed_brackets_is_malformed() {
        let err = parse_response("] nothing here [").unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    #[test]
    fn test_invalid_json_is_malformed() {
        let err = parse_response(r#"[{"title": "Broken",}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));

        let err = parse_response(r#"[{"title": "Broken"]"#).unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    #[test]
    fn test_empty_array_is_malformed() {
        let err = parse_response("[]").unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    // Partial-element policy: undecodable elements are dropped, the rest kept.
    #[test]
    fn test_partial_elements_are_skipped() {
        let raw = r#"[{"title":"Good"},{"description":"no title"},"stray",{"title":"Also good"}]"#;
        let candidates = parse_response(raw).unwrap();
        let titles: Vec<&str> = candidates.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Good", "Also good"]);
    }

    #[test]
    fn test_all_elements_invalid_is_malformed() {
        let err = parse_response(r#"[{"description":"x"}, 42]"#).unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    #[test]
    fn test_unknown_fields_ignored_and_defaults_filled() {
        let raw = r#"[{"title":"T","people":["Ann"],"confidence":0.9}]"#;
        let candidate = &parse_response(raw).unwrap()[0];
        assert_eq!(candidate.priority, TaskPriority::Medium);
        assert_eq!(candidate.category, "General");
        assert!(candidate.tags.is_empty());
    }

    #[test]
    fn test_parser_struct_delegates() {
        assert_eq!(ResponseParser::new().parse(AWS_ARRAY).unwrap().len(), 1);
    }
}
