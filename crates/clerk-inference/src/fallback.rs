//! Degraded task generation.
//!
//! When extraction fails the raw input still becomes a task: the text is
//! kept verbatim as the description and a best-effort title and tag set are
//! derived from it.

use chrono::{DateTime, Duration, Utc};

use clerk_core::{defaults, TaskCandidate, TaskPriority};

/// Characters removed from fallback titles.
const STRIPPED_TITLE_CHARS: [char; 7] = ['`', '[', ']', '{', '}', '"', '\''];

/// Builds the single candidate used on the degraded path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackGenerator;

impl FallbackGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a candidate relative to the current time. Never fails.
    pub fn generate(&self, raw_text: &str) -> TaskCandidate {
        self.generate_at(raw_text, Utc::now())
    }

    /// Generate a candidate relative to `now`.
    pub fn generate_at(&self, raw_text: &str, now: DateTime<Utc>) -> TaskCandidate {
        let due = now + Duration::hours(defaults::FALLBACK_DUE_HOURS);
        let reminder = due - Duration::minutes(defaults::FALLBACK_REMINDER_LEAD_MINUTES);

        TaskCandidate {
            title: fallback_title(raw_text),
            description: raw_text.to_string(),
            due_date: Some(due),
            reminder_time: Some(reminder),
            priority: TaskPriority::Medium,
            category: defaults::DEFAULT_CATEGORY_NAME.to_string(),
            tags: heuristic_tags(raw_text),
        }
    }
}

/// Sanitized, single-line, length-bounded title. Whitespace runs (newlines
/// included) collapse to one space before the length check, which counts
/// characters, not bytes.
fn fallback_title(raw_text: &str) -> String {
    let cleaned: String = raw_text
        .chars()
        .filter(|c| !STRIPPED_TITLE_CHARS.contains(c))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.is_empty() {
        return defaults::FALLBACK_EMPTY_TITLE.to_string();
    }

    let max = defaults::FALLBACK_TITLE_MAX_CHARS;
    if collapsed.chars().count() <= max {
        return collapsed;
    }

    let keep = max - defaults::FALLBACK_ELLIPSIS.chars().count();
    let mut title: String = collapsed.chars().take(keep).collect();
    title.push_str(defaults::FALLBACK_ELLIPSIS);
    title
}

/// Up to three distinct capitalized words longer than four characters.
fn heuristic_tags(raw_text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for word in raw_text.split_whitespace() {
        let cleaned: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        let capitalized = cleaned.chars().next().is_some_and(char::is_uppercase);
        if capitalized
            && cleaned.chars().count() > defaults::FALLBACK_TAG_MIN_EXCLUSIVE_LEN
            && !tags.contains(&cleaned)
        {
            tags.push(cleaned);
            if tags.len() == defaults::FALLBACK_MAX_TAGS {
                break;
            }
        }
    }
    tags
}
