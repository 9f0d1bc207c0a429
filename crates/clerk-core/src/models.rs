//! Core data models for clerk.
//!
//! These types are shared across all clerk crates and represent the
//! ingestion domain: raw inputs, their audit records, transient task
//! candidates, and the persisted task/category/tag entities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use crate::defaults;

// =============================================================================
// ENUMS
// =============================================================================

/// Task priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "LOW",
            TaskPriority::Medium => "MEDIUM",
            TaskPriority::High => "HIGH",
            TaskPriority::Urgent => "URGENT",
        }
    }

    /// Parse a priority label, mapping anything unrecognized to MEDIUM.
    pub fn from_label_lenient(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            warn!(priority = label, "Unknown priority label, using MEDIUM");
            TaskPriority::Medium
        })
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(TaskPriority::Low),
            "MEDIUM" => Ok(TaskPriority::Medium),
            "HIGH" => Ok(TaskPriority::High),
            "URGENT" => Ok(TaskPriority::Urgent),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a raw input reached the system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InputType {
    #[default]
    Text,
    /// Voice note, already transcribed to text upstream.
    Voice,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Text => "TEXT",
            InputType::Voice => "VOICE",
        }
    }
}

impl FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Ok(InputType::Text),
            "VOICE" => Ok(InputType::Voice),
            other => Err(format!("unknown input type: {}", other)),
        }
    }
}

// =============================================================================
// OWNER TYPES
// =============================================================================

/// Per-owner preferences consulted by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Preferred AI backend ("ollama", "qianwen", ...).
    pub ai_model: Option<String>,
    /// BCP-47-ish language tag, e.g. "en" or "zh-CN".
    pub preferred_language: Option<String>,
}

/// The user on whose behalf an ingestion runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Owner {
    pub id: Uuid,
    pub username: String,
    pub settings: UserSettings,
}

// =============================================================================
// RAW INPUT / AUDIT TYPES
// =============================================================================

/// Immutable record of an original natural-language submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInput {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub content: String,
    pub input_type: InputType,
    pub created_at_utc: DateTime<Utc>,
    /// Tasks materialized from this input (backed by `task.raw_input_id`).
    #[serde(default)]
    pub generated_task_ids: Vec<Uuid>,
}

/// Request for persisting a raw input.
#[derive(Debug, Clone)]
pub struct NewRawInput {
    pub owner_id: Uuid,
    pub content: String,
    pub input_type: InputType,
    pub received_at: DateTime<Utc>,
}

/// Audit record of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiProcessingResult {
    pub id: Uuid,
    pub raw_input_id: Uuid,
    /// JSON of the candidates that were materialized.
    pub processed_content: String,
    /// Categories and tags referenced by the candidates.
    pub extracted_entities: Option<String>,
    pub ai_model_used: String,
    pub processing_time_ms: i64,
    pub confidence_score: f64,
    /// True when the fallback candidate replaced extraction output.
    pub degraded: bool,
    pub failure_reason: Option<String>,
    pub created_at_utc: DateTime<Utc>,
}

/// Request for persisting an extraction audit record.
#[derive(Debug, Clone)]
pub struct NewProcessingResult {
    pub raw_input_id: Uuid,
    pub processed_content: String,
    pub extracted_entities: Option<String>,
    pub ai_model_used: String,
    pub processing_time_ms: i64,
    pub confidence_score: f64,
    pub degraded: bool,
    pub failure_reason: Option<String>,
}

// =============================================================================
// TASK CANDIDATE (transient)
// =============================================================================

/// A structured task extracted from text, not yet persisted.
///
/// Deserialization is lenient about everything except `title`: missing
/// optional fields take their defaults, `null` is treated as absent, and
/// unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCandidate {
    #[serde(deserialize_with = "de_title")]
    pub title: String,
    #[serde(default, deserialize_with = "de_text_or_null")]
    pub description: String,
    #[serde(default, deserialize_with = "de_lenient_datetime")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_lenient_datetime")]
    pub reminder_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_priority")]
    pub priority: TaskPriority,
    #[serde(
        default = "default_category",
        deserialize_with = "de_category",
        alias = "categoryName"
    )]
    pub category: String,
    #[serde(default, deserialize_with = "de_tags")]
    pub tags: Vec<String>,
}

impl TaskCandidate {
    /// Candidate with the given title and every other field defaulted.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            due_date: None,
            reminder_time: None,
            priority: TaskPriority::Medium,
            category: default_category(),
            tags: Vec::new(),
        }
    }
}

fn default_category() -> String {
    defaults::DEFAULT_CATEGORY_NAME.to_string()
}

fn de_title<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match JsonValue::deserialize(deserializer)? {
        JsonValue::String(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        other => Err(serde::de::Error::custom(format!(
            "title must be a non-empty string, got {}",
            other
        ))),
    }
}

fn de_text_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) => s,
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

fn de_lenient_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(s)) if s.trim().is_empty() || s.trim() == "null" => None,
        Some(JsonValue::String(s)) => Some(parse_lenient_datetime(&s).unwrap_or_else(|| {
            warn!(value = %s, "Unparseable date from extraction, defaulting to now + 24h");
            Utc::now() + Duration::hours(defaults::FALLBACK_DUE_HOURS)
        })),
        Some(other) => {
            warn!(value = %other, "Non-string date from extraction, defaulting to now + 24h");
            Some(Utc::now() + Duration::hours(defaults::FALLBACK_DUE_HOURS))
        }
    })
}

fn de_priority<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TaskPriority, D::Error> {
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) => TaskPriority::from_label_lenient(&s),
        _ => TaskPriority::Medium,
    })
}

fn de_category<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => default_category(),
    })
}

fn de_tags<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw: Vec<String> = match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                JsonValue::String(s) => Some(s),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(JsonValue::String(s)) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    };

    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for tag in raw {
        let tag = tag.trim();
        if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    Ok(tags)
}

/// Parse the date formats language models tend to emit.
///
/// Accepts RFC 3339, naive `YYYY-MM-DDTHH:MM[:SS]` and `YYYY-MM-DD HH:MM[:SS]`
/// (interpreted as UTC), and bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_lenient_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// =============================================================================
// CATEGORY / TAG TYPES
// =============================================================================

/// Per-owner task category. Unique per (owner, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub is_default: bool,
    pub created_at_utc: DateTime<Utc>,
}

/// Request for creating a category.
#[derive(Debug, Clone)]
pub struct NewCategory {
    pub owner_id: Uuid,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub is_default: bool,
}

/// Per-owner tag. Unique per (owner, name).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub created_at_utc: DateTime<Utc>,
}

// =============================================================================
// TASK TYPES
// =============================================================================

/// A persisted task with its category and tags resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub raw_input_id: Option<Uuid>,
    /// Verbatim text of the originating raw input, when there is one.
    pub original_input_text: Option<String>,
    pub created_at_utc: DateTime<Utc>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Mark the task completed. `completed_at` only moves on a real transition.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) {
        if !self.completed {
            self.completed = true;
            self.completed_at = Some(at);
        }
    }

    /// Reopen the task, clearing `completed_at`.
    pub fn mark_not_completed(&mut self) {
        self.completed = false;
        self.completed_at = None;
    }

    /// Names of the attached tags, in attachment order.
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Request for inserting a task whose category and tags are already resolved.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: Option<DateTime<Utc>>,
    pub reminder_time: Option<DateTime<Utc>>,
    pub priority: TaskPriority,
    pub category: Category,
    pub tags: Vec<Tag>,
    pub raw_input_id: Option<Uuid>,
    pub original_input_text: Option<String>,
}
