//! Extraction prompt construction.
//!
//! Every locale embeds the same schema contract so the parser sees one
//! output shape regardless of the language the instructions are written in.

use serde::{Deserialize, Serialize};

/// Language the extraction instructions are written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptLocale {
    #[default]
    English,
    Chinese,
}

impl PromptLocale {
    /// Pick a locale from a language tag such as `en-US` or `zh-CN`.
    ///
    /// Anything that is not Chinese maps to English.
    pub fn from_language_tag(tag: Option<&str>) -> Self {
        match tag {
            Some(t) if t.trim().to_ascii_lowercase().starts_with("zh") => PromptLocale::Chinese,
            _ => PromptLocale::English,
        }
    }
}

/// Output contract shared by all locales. Field names match `TaskCandidate`.
pub const SCHEMA_CONTRACT: &str = r#"[
  {
    "title": "string, required",
    "description": "string",
    "dueDate": "ISO-8601 date-time, e.g. 2025-01-31T14:00:00",
    "reminderTime": "ISO-8601 date-time",
    "priority": "LOW | MEDIUM | HIGH | URGENT",
    "category": "string",
    "tags": ["string"]
  }
]"#;

const ENGLISH_INSTRUCTIONS: &str = "Extract tasks, time information, people, and categories \
from the following text. Return the result as a JSON array where each element has this \
structure:";

const ENGLISH_RULES: &str = "Return only the JSON array. Omit fields you cannot determine. \
If the text contains no explicit task, return a single task that summarizes it.";

const CHINESE_INSTRUCTIONS: &str =
    "从以下文本中提取任务、时间信息、人物和分类。请以 JSON 数组的形式返回结果，数组中每个元素的结构如下：";

const CHINESE_RULES: &str =
    "只返回 JSON 数组。无法确定的字段请省略。如果文本中没有明确的任务，请返回一个概括该文本的任务。";

/// Builds the instruction text sent to an extraction backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptBuilder {
    locale: PromptLocale,
}

impl PromptBuilder {
    pub fn new(locale: PromptLocale) -> Self {
        Self { locale }
    }

    pub fn locale(&self) -> PromptLocale {
        self.locale
    }

    /// Render the prompt for `input`. Pure: same input, same output.
    pub fn build(&self, input: &str) -> String {
        let (instructions, rules, text_label) = match self.locale {
            PromptLocale::English => (ENGLISH_INSTRUCTIONS, ENGLISH_RULES, "Text: "),
            PromptLocale::Chinese => (CHINESE_INSTRUCTIONS, CHINESE_RULES, "文本："),
        };

        format!(
            "{}\n{}\n{}\n\n{}{}",
            instructions, SCHEMA_CONTRACT, rules, text_label, input
        )
    }
}
