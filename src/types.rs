//! Question history, generation results and journal entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Unique identifier for remembered questions
pub type QuestionId = String;

/// A previously produced question
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    /// Unique identifier
    pub id: QuestionId,
    /// The accepted question (trimmed, never empty)
    pub text: String,
    /// Cached embedding, filled lazily by the embedding gate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Theme the question was generated for
    #[serde(default)]
    pub theme: String,
    /// Opening word the question was asked to start with
    #[serde(default)]
    pub opening_word: String,
    /// Prompt template used for generation
    #[serde(default)]
    pub prompt: String,
    /// When the question was produced
    pub created_at: DateTime<Utc>,
}

impl HistoryItem {
    /// Create a history item with a fresh id and the current time
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into().trim().to_string(),
            embedding: None,
            theme: String::new(),
            opening_word: String::new(),
            prompt: String::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = theme.into();
        self
    }

    pub fn with_opening_word(mut self, opening_word: impl Into<String>) -> Self {
        self.opening_word = opening_word.into();
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = prompt.into();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Whether the item carries usable text
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Input for remembering a question; missing fields get defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHistoryItem {
    #[serde(default)]
    pub id: Option<QuestionId>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub opening_word: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewHistoryItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<QuestionId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_opening_word(mut self, opening_word: impl Into<String>) -> Self {
        self.opening_word = Some(opening_word.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Normalize into a stored item. Returns `None` when the text is blank.
    pub fn into_item(self) -> Option<HistoryItem> {
        let text = self.text.trim().to_string();
        if text.is_empty() {
            return None;
        }

        Some(HistoryItem {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            text,
            embedding: self.embedding,
            theme: self.theme.unwrap_or_default(),
            opening_word: self.opening_word.unwrap_or_default(),
            prompt: self.prompt.unwrap_or_default(),
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}

impl From<HistoryItem> for NewHistoryItem {
    fn from(item: HistoryItem) -> Self {
        Self {
            id: Some(item.id),
            text: item.text,
            embedding: item.embedding,
            theme: Some(item.theme),
            opening_word: Some(item.opening_word),
            prompt: Some(item.prompt),
            created_at: Some(item.created_at),
        }
    }
}

/// Why a candidate was rejected during one generation attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// The generator itself failed
    GenerationError { detail: String },
    /// Nothing usable remained after cleaning
    EmptyOutput,
    /// Too many words
    WordLimit { words: usize, question: String },
    /// Contains a banned term
    BannedTerm { banned: String, question: String },
    /// Too close to a remembered question by string metrics
    StringSimilarity {
        score: f64,
        matched: String,
        question: String,
    },
    /// Too close to a remembered question by embedding cosine
    EmbeddingSimilarity {
        score: f64,
        matched: String,
        question: String,
    },
    /// The embedding provider failed for the candidate
    EmbeddingError { detail: String, question: String },
}

impl Rejection {
    /// Stable reason tag
    pub fn reason(&self) -> &'static str {
        match self {
            Rejection::GenerationError { .. } => "generation_error",
            Rejection::EmptyOutput => "empty_output",
            Rejection::WordLimit { .. } => "word_limit",
            Rejection::BannedTerm { .. } => "banned_term",
            Rejection::StringSimilarity { .. } => "string_similarity",
            Rejection::EmbeddingSimilarity { .. } => "embedding_similarity",
            Rejection::EmbeddingError { .. } => "embedding_error",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::GenerationError { detail } => write!(f, "generation_error: {}", detail),
            Rejection::EmptyOutput => write!(f, "empty_output"),
            Rejection::WordLimit { words, question } => {
                write!(f, "word_limit: {} words in {:?}", words, question)
            }
            Rejection::BannedTerm { banned, question } => {
                write!(f, "banned_term: {:?} in {:?}", banned, question)
            }
            Rejection::StringSimilarity {
                score,
                matched,
                question,
            } => write!(
                f,
                "string_similarity: {:.3} between {:?} and {:?}",
                score, question, matched
            ),
            Rejection::EmbeddingSimilarity {
                score,
                matched,
                question,
            } => write!(
                f,
                "embedding_similarity: {:.3} between {:?} and {:?}",
                score, question, matched
            ),
            Rejection::EmbeddingError { detail, .. } => write!(f, "embedding_error: {}", detail),
        }
    }
}

/// Outcome of one `generate` call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub id: QuestionId,
    pub question: String,
    pub theme: String,
    pub opening_word: String,
    pub prompt: String,
    pub embedding: Option<Vec<f32>>,
    /// Attempts consumed (equals `maxAttempts` on fallback)
    pub attempts: usize,
    /// Every rejection recorded during this call, in order
    pub rejected: Vec<Rejection>,
    pub created_at: DateTime<Utc>,
    pub from_fallback: bool,
}

impl GenerationResult {
    /// The history item this result is remembered as
    pub fn to_history_item(&self) -> HistoryItem {
        HistoryItem {
            id: self.id.clone(),
            text: self.question.clone(),
            embedding: self.embedding.clone(),
            theme: self.theme.clone(),
            opening_word: self.opening_word.clone(),
            prompt: self.prompt.clone(),
            created_at: self.created_at,
        }
    }

    /// Reason tags of all rejections, in order
    pub fn rejection_reasons(&self) -> Vec<&'static str> {
        self.rejected.iter().map(Rejection::reason).collect()
    }
}

/// Missing text is stored as `null` by some writers
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// One journal entry as stored by the persistence layer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntry {
    #[serde(default)]
    pub id: Option<String>,
    /// Sequential day label
    #[serde(default)]
    pub day: Option<String>,
    /// ISO calendar date (`YYYY-MM-DD`); entries without one are ignored by analytics
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub feeling: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reflection: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub grateful_for: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reflection_question: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub reflection_prompt: String,
}

impl JournalEntry {
    pub fn new(date: impl Into<String>) -> Self {
        Self {
            date: Some(date.into()),
            ..Self::default()
        }
    }

    pub fn with_feeling(mut self, feeling: impl Into<String>) -> Self {
        self.feeling = feeling.into();
        self
    }

    pub fn with_reflection(mut self, reflection: impl Into<String>) -> Self {
        self.reflection = reflection.into();
        self
    }

    pub fn with_grateful_for(mut self, grateful_for: impl Into<String>) -> Self {
        self.grateful_for = grateful_for.into();
        self
    }

    pub fn with_question(
        mut self,
        question: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        self.reflection_question = question.into();
        self.reflection_prompt = prompt.into();
        self
    }

    /// The date, when present and non-empty
    pub fn dated(&self) -> Option<&str> {
        self.date.as_deref().filter(|d| !d.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_history_item_defaults() {
        let item = NewHistoryItem::new("  Who shaped you?  ").into_item().unwrap();
        assert_eq!(item.text, "Who shaped you?");
        assert!(!item.id.is_empty());
        assert!(item.theme.is_empty());
        assert!(item.embedding.is_none());
    }

    #[test]
    fn test_blank_history_item_is_dropped() {
        assert!(NewHistoryItem::new("   ").into_item().is_none());
    }

    #[test]
    fn test_rejection_serializes_with_reason_tag() {
        let rejection = Rejection::BannedTerm {
            banned: "today".into(),
            question: "What did you learn today?".into(),
        };
        let json = serde_json::to_value(&rejection).unwrap();
        assert_eq!(json["reason"], "banned_term");
        assert_eq!(json["banned"], "today");
        assert_eq!(rejection.reason(), "banned_term");
    }

    #[test]
    fn test_journal_entry_deserializes_camel_case() {
        let entry: JournalEntry = serde_json::from_str(
            r#"{"date":"2024-01-01","gratefulFor":"- tea\n- sun","reflectionQuestion":"Why?"}"#,
        )
        .unwrap();
        assert_eq!(entry.dated(), Some("2024-01-01"));
        assert_eq!(entry.grateful_for, "- tea\n- sun");
        assert_eq!(entry.reflection_question, "Why?");
        assert!(entry.feeling.is_empty());
    }

    #[test]
    fn test_journal_entry_null_fields() {
        let entries: Vec<JournalEntry> = serde_json::from_str(
            r#"[{"date":"2024-01-01","feeling":null,"reflection":"went for a run","gratefulFor":null,"reflectionQuestion":null,"reflectionPrompt":null}]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].feeling.is_empty());
        assert!(entries[0].grateful_for.is_empty());
        assert!(entries[0].reflection_question.is_empty());
        assert_eq!(entries[0].reflection, "went for a run");
    }
}
