//! Prompt provenance
//!
//! Generated questions travel with the template they were generated from
//! (`Theme: X | Start with: Y`). Older entries sometimes stored the question
//! itself in the prompt field, so both fields are normalized before use.

use crate::types::{JournalEntry, NewHistoryItem};

use chrono::{NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static THEME_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Theme:\s*([^|]+)").unwrap());
static OPENING_FIELD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)Start with:\s*([^|]+)").unwrap());
static META_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*Theme:").unwrap());

/// Fields recovered from a prompt template; empty when absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptMeta {
    pub theme: String,
    pub opening_word: String,
}

/// Question and prompt as they should be stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptFields {
    pub question: String,
    pub prompt: String,
}

fn capture(re: &Regex, text: &str) -> String {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Extract theme and opening word from a prompt template
pub fn parse_prompt_meta(prompt: &str) -> PromptMeta {
    PromptMeta {
        theme: capture(&THEME_FIELD, prompt),
        opening_word: capture(&OPENING_FIELD, prompt),
    }
}

/// Whether `text` is template metadata rather than a question
pub fn looks_like_prompt_meta(text: &str) -> bool {
    META_PREFIX.is_match(text)
}

/// Decide what to store for a submitted question/prompt pair.
///
/// A prompt that is not template metadata is really the question; only
/// metadata is kept as the prompt.
pub fn normalize_prompt_fields(prompt: &str, question: &str) -> PromptFields {
    let is_meta = looks_like_prompt_meta(prompt);
    let question = question.trim();

    let question = if !question.is_empty() {
        question.to_string()
    } else if !is_meta {
        prompt.trim().to_string()
    } else {
        String::new()
    };

    PromptFields {
        question,
        prompt: if is_meta {
            prompt.trim().to_string()
        } else {
            String::new()
        },
    }
}

/// The question an entry was answering, if any
pub fn entry_question(entry: &JournalEntry) -> Option<String> {
    let fields = normalize_prompt_fields(&entry.reflection_prompt, &entry.reflection_question);
    (!fields.question.is_empty()).then_some(fields.question)
}

/// Rebuild question history from stored journal entries.
///
/// Takes the newest `limit` entries by date, keeps those that carry a
/// question, and returns them oldest first.
pub fn history_from_entries(entries: &[JournalEntry], limit: usize) -> Vec<NewHistoryItem> {
    let mut newest: Vec<&JournalEntry> = entries.iter().collect();
    newest.sort_by(|a, b| b.date.cmp(&a.date));
    newest.truncate(limit);

    let mut items: Vec<NewHistoryItem> = newest
        .into_iter()
        .filter_map(|entry| {
            let question = entry_question(entry)?;
            let meta = parse_prompt_meta(&entry.reflection_prompt);

            let mut item = NewHistoryItem::new(question)
                .with_prompt(entry.reflection_prompt.clone())
                .with_theme(meta.theme)
                .with_opening_word(meta.opening_word);
            if let Some(id) = entry.id.as_deref().filter(|id| !id.is_empty()) {
                item = item.with_id(id);
            }
            if let Some(date) = entry
                .dated()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
            {
                item = item.with_created_at(Utc.from_utc_datetime(&date));
            }
            Some(item)
        })
        .collect();

    items.reverse();
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt_meta() {
        let meta = parse_prompt_meta("Theme: future self | Start with: How");
        assert_eq!(meta.theme, "future self");
        assert_eq!(meta.opening_word, "How");

        let partial = parse_prompt_meta("theme:   money  ");
        assert_eq!(partial.theme, "money");
        assert!(partial.opening_word.is_empty());

        assert_eq!(parse_prompt_meta("no template here"), PromptMeta::default());
    }

    #[test]
    fn test_looks_like_prompt_meta() {
        assert!(looks_like_prompt_meta("  theme: fear | Start with: Why"));
        assert!(!looks_like_prompt_meta("Why does the Theme: matter?"));
        assert!(!looks_like_prompt_meta(""));
    }

    #[test]
    fn test_normalize_prompt_fields() {
        let fields = normalize_prompt_fields("Theme: fear | Start with: Why", " Why now? ");
        assert_eq!(fields.question, "Why now?");
        assert_eq!(fields.prompt, "Theme: fear | Start with: Why");

        // Legacy entries stored the question in the prompt field
        let legacy = normalize_prompt_fields("Who inspires you?", "");
        assert_eq!(legacy.question, "Who inspires you?");
        assert!(legacy.prompt.is_empty());

        let bare = normalize_prompt_fields("Theme: fear", "");
        assert!(bare.question.is_empty());

        let padded = normalize_prompt_fields("  Theme: joy | Start with: Who \n", "Who?");
        assert_eq!(padded.prompt, "Theme: joy | Start with: Who");
    }

    #[test]
    fn test_history_from_entries() {
        let entries = vec![
            JournalEntry::new("2024-01-03")
                .with_question("Why rest?", "Theme: health | Start with: Why"),
            JournalEntry::new("2024-01-01").with_question("Who helped?", ""),
            JournalEntry::new("2024-01-02"),
            JournalEntry::new("2024-01-04").with_question("", "When did you laugh?"),
        ];

        let items = history_from_entries(&entries, 3);
        let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
        // 2024-01-01 falls outside the newest three; 2024-01-02 has no question
        assert_eq!(texts, vec!["Why rest?", "When did you laugh?"]);

        assert_eq!(items[0].theme.as_deref(), Some("health"));
        assert_eq!(items[0].opening_word.as_deref(), Some("Why"));
        assert_eq!(
            items[0].created_at.map(|t| t.format("%Y-%m-%d").to_string()),
            Some("2024-01-03".to_string())
        );
    }
}
