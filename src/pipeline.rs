//! # Anti-repetition prompt pipeline
//!
//! One `generate` call runs a bounded retry loop:
//! - Rotation: pick a theme and opening word from the configured lists
//! - Generation: ask the injected `CandidateGenerator` for raw text
//! - Cleaning: first non-blank line, labels/bullets stripped, `?` appended
//! - Gates: word limit, ban list, string similarity, embedding similarity
//!
//! The first candidate that passes every gate is remembered and returned.
//! When all attempts are rejected a fallback question is returned instead;
//! generation failures never surface as errors.

use crate::config::{
    PipelineConfig, PipelineConfigPatch, DEFAULT_OPENING_WORD, DEFAULT_THEME,
    GENERIC_FALLBACK_QUESTION,
};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::generator::{CandidateContext, CandidateGenerator};
use crate::history::{HistoryStore, InMemoryHistoryStore};
use crate::provenance::parse_prompt_meta;
use crate::similarity::{cosine, dice, jaccard, levenshtein_similarity, normalize_text, tokens};
use crate::types::{GenerationResult, HistoryItem, NewHistoryItem, Rejection};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

static QUESTION_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^question:\s*").unwrap());
static LEADING_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^[\s\-*\d)."']+"#).unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_MARKS: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[."']+$"#).unwrap());

/// Build the template string handed to the generator
pub fn build_prompt_template(theme: &str, opening_word: &str) -> String {
    format!("Theme: {} | Start with: {}", theme, opening_word)
}

/// Reduce raw generator output to a single question.
///
/// Returns an empty string when nothing usable remains.
pub fn clean_question(raw: &str) -> String {
    let line = raw
        .split('\n')
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    let text = QUESTION_LABEL.replace(line, "");
    let text = LEADING_MARKERS.replace(&text, "");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    let text = TRAILING_MARKS.replace(&text, "");
    let mut text = text.trim().to_string();

    if !text.is_empty() && !text.ends_with('?') {
        text.push('?');
    }
    text
}

/// A history item the candidate was judged too close to
#[derive(Debug, Clone, PartialEq)]
pub struct Duplicate {
    /// Position in the scanned history
    pub index: usize,
    pub matched: String,
    pub score: f64,
}

/// Result of scanning history by embedding
///
/// Embeddings fetched for history items that lacked one are returned in
/// `backfilled` rather than written anywhere; the caller decides whether to
/// keep them.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingScan {
    pub duplicate: Option<Duplicate>,
    pub backfilled: Vec<(usize, Vec<f32>)>,
}

impl PipelineConfig {
    /// Theme for a rotation index
    pub fn theme_at(&self, index: usize) -> &str {
        let themes = &self.rotation.themes;
        if themes.is_empty() {
            return DEFAULT_THEME;
        }
        &themes[index % themes.len()]
    }

    /// Opening word for a rotation index
    pub fn opening_word_at(&self, index: usize) -> &str {
        let words = &self.rotation.opening_words;
        if words.is_empty() {
            return DEFAULT_OPENING_WORD;
        }
        &words[index % words.len()]
    }

    /// First configured banned term contained in the normalized text
    pub fn find_banned_term(&self, text: &str) -> Option<&str> {
        let normalized = normalize_text(text);
        self.filters
            .banned_terms
            .iter()
            .find(|term| normalized.contains(&normalize_text(term)))
            .map(String::as_str)
    }

    /// Max of the enabled string metrics; 0.0 when none are enabled
    pub fn string_similarity(&self, a: &str, b: &str) -> f64 {
        let mut best: Option<f64> = None;
        let mut consider = |score: f64| best = Some(best.map_or(score, |b: f64| b.max(score)));

        if self.similarity.use_jaccard {
            consider(jaccard(a, b));
        }
        if self.similarity.use_dice {
            consider(dice(a, b));
        }
        if self.similarity.use_levenshtein {
            consider(levenshtein_similarity(a, b));
        }

        best.unwrap_or(0.0)
    }

    /// First history item (oldest first) at or above the string threshold
    pub fn find_string_duplicate(
        &self,
        candidate: &str,
        history: &[HistoryItem],
    ) -> Option<Duplicate> {
        history.iter().enumerate().find_map(|(index, item)| {
            let score = self.string_similarity(candidate, &item.text);
            (score >= self.similarity.string_threshold).then(|| Duplicate {
                index,
                matched: item.text.clone(),
                score,
            })
        })
    }

    /// Fallback question for a history size
    pub fn fallback_question(&self, history_size: usize) -> &str {
        let list = &self.fallback_questions;
        if list.is_empty() {
            return GENERIC_FALLBACK_QUESTION;
        }
        &list[history_size % list.len()]
    }

    /// Scan history by cosine similarity, fetching missing embeddings lazily.
    ///
    /// A history item whose embedding cannot be fetched is skipped.
    pub async fn find_embedding_duplicate(
        &self,
        candidate: &[f32],
        history: &[HistoryItem],
        embedder: &dyn EmbeddingProvider,
    ) -> EmbeddingScan {
        let mut scan = EmbeddingScan::default();

        for (index, item) in history.iter().enumerate() {
            let fetched;
            let compared: &[f32] = match &item.embedding {
                Some(embedding) => embedding,
                None => match embedder.embed_one(&item.text).await {
                    Ok(embedding) => {
                        scan.backfilled.push((index, embedding.clone()));
                        fetched = embedding;
                        &fetched
                    }
                    Err(e) => {
                        tracing::warn!("Skipping history item {}: {}", item.id, e);
                        continue;
                    }
                },
            };

            let score = cosine(candidate, compared);
            if score >= self.similarity.embedding_threshold {
                scan.duplicate = Some(Duplicate {
                    index,
                    matched: item.text.clone(),
                    score,
                });
                break;
            }
        }

        scan
    }
}

/// Inputs for one `generate` call
pub struct GenerateRequest<'a> {
    generator: &'a dyn CandidateGenerator,
    external_history: Vec<HistoryItem>,
    embedder: Option<&'a dyn EmbeddingProvider>,
}

impl<'a> GenerateRequest<'a> {
    pub fn new(generator: &'a dyn CandidateGenerator) -> Self {
        Self {
            generator,
            external_history: Vec::new(),
            embedder: None,
        }
    }

    /// Extra history from outside the store, used for de-duplication only
    pub fn with_external_history(mut self, history: Vec<HistoryItem>) -> Self {
        self.external_history = history;
        self
    }

    /// Enables the embedding gate (when `steps.embeddingSimilarity` is on)
    pub fn with_embedder(mut self, embedder: &'a dyn EmbeddingProvider) -> Self {
        self.embedder = Some(embedder);
        self
    }
}

enum Verdict {
    Accepted {
        question: String,
        embedding: Option<Vec<f32>>,
    },
    Rejected(Rejection),
}

/// Question generator with anti-repetition gates
pub struct PromptPipeline {
    config: RwLock<PipelineConfig>,
    store: Arc<dyn HistoryStore>,
}

impl std::fmt::Debug for PromptPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptPipeline")
            .field("store", &self.store.backend_name())
            .finish()
    }
}

impl PromptPipeline {
    /// Create a pipeline over `store`, merging `patch` onto the defaults
    pub async fn new(patch: &PipelineConfigPatch, store: Arc<dyn HistoryStore>) -> Result<Self> {
        let config = PipelineConfig::default().merge(patch);
        config.validate()?;
        store.set_limit(config.history_limit()).await?;

        Ok(Self {
            config: RwLock::new(config),
            store,
        })
    }

    /// Create a pipeline backed by a fresh in-memory store
    pub async fn in_memory(patch: &PipelineConfigPatch) -> Result<Self> {
        Self::new(patch, Arc::new(InMemoryHistoryStore::default())).await
    }

    /// Merge `patch` into the current config; the store is re-limited immediately
    pub async fn update_config(&self, patch: &PipelineConfigPatch) -> Result<()> {
        let mut config = self.config.write().await;
        let merged = config.merge(patch);
        merged.validate()?;
        self.store.set_limit(merged.history_limit()).await?;
        *config = merged;
        Ok(())
    }

    /// Snapshot of the current config
    pub async fn config(&self) -> PipelineConfig {
        self.config.read().await.clone()
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    pub async fn history(&self) -> Result<Vec<HistoryItem>> {
        self.store.get_all().await
    }

    /// Replace history; items without text are dropped
    pub async fn set_history(&self, items: Vec<NewHistoryItem>) -> Result<()> {
        let items: Vec<HistoryItem> = items
            .into_iter()
            .filter_map(NewHistoryItem::into_item)
            .collect();
        self.store.seed(items).await
    }

    /// Append to history. Returns the stored item, or `None` for blank text.
    pub async fn remember(&self, item: NewHistoryItem) -> Result<Option<HistoryItem>> {
        let Some(item) = item.into_item() else {
            return Ok(None);
        };
        self.store.add(item.clone()).await?;
        Ok(Some(item))
    }

    /// Remember a question the user actually answered.
    ///
    /// Theme and opening word are recovered from the prompt template. Skipped
    /// when blank or when it repeats the newest history item (case-insensitive).
    pub async fn remember_question(
        &self,
        question: &str,
        prompt: &str,
        created_at: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let text = question.trim();
        if text.is_empty() {
            return Ok(false);
        }

        let history = self.store.get_all().await?;
        if let Some(latest) = history.last() {
            if latest.text.to_lowercase() == text.to_lowercase() {
                return Ok(false);
            }
        }

        let meta = parse_prompt_meta(prompt);
        let mut item = NewHistoryItem::new(text)
            .with_prompt(prompt)
            .with_theme(meta.theme)
            .with_opening_word(meta.opening_word);
        item.created_at = created_at;

        Ok(self.remember(item).await?.is_some())
    }

    /// Produce one question, accepted or fallback
    pub async fn generate(&self, request: GenerateRequest<'_>) -> Result<GenerationResult> {
        let config = self.config().await;
        let GenerateRequest {
            generator,
            external_history,
            embedder,
        } = request;

        let mut working: Vec<HistoryItem> = self
            .store
            .get_all()
            .await?
            .into_iter()
            .chain(external_history)
            .filter(HistoryItem::has_text)
            .collect();
        let excess = working.len().saturating_sub(config.history_limit());
        working.drain(..excess);

        let history_size = working.len();
        let embedder = embedder.filter(|_| config.steps.embedding_similarity);
        let mut rejected = Vec::new();

        for attempt in 0..config.generation.max_attempts {
            let rotation_index = history_size + attempt;
            let (theme, opening_word) = if config.steps.rotation {
                (
                    config.theme_at(rotation_index).to_string(),
                    config.opening_word_at(rotation_index * 3 + attempt).to_string(),
                )
            } else {
                (DEFAULT_THEME.to_string(), DEFAULT_OPENING_WORD.to_string())
            };
            let context = CandidateContext {
                attempt,
                prompt: build_prompt_template(&theme, &opening_word),
                theme,
                opening_word,
            };

            let raw = match generator.generate(&context).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!("Candidate generation failed on attempt {}: {}", attempt, e);
                    rejected.push(Rejection::GenerationError {
                        detail: e.to_string(),
                    });
                    continue;
                }
            };

            match self.evaluate(&config, &raw, &mut working, embedder).await {
                Verdict::Rejected(rejection) => {
                    tracing::debug!("Attempt {} rejected: {}", attempt, rejection);
                    rejected.push(rejection);
                }
                Verdict::Accepted {
                    question,
                    embedding,
                } => {
                    tracing::debug!("Attempt {} accepted: {:?}", attempt, question);
                    let result = GenerationResult {
                        id: Uuid::new_v4().to_string(),
                        question,
                        theme: context.theme,
                        opening_word: context.opening_word,
                        prompt: context.prompt,
                        embedding,
                        attempts: attempt + 1,
                        rejected,
                        created_at: Utc::now(),
                        from_fallback: false,
                    };
                    self.remember(result.to_history_item().into()).await?;
                    return Ok(result);
                }
            }
        }

        // Fallback always rotates, even when attempts use the fixed context
        let theme = config.theme_at(history_size).to_string();
        let opening_word = config.opening_word_at(history_size).to_string();

        tracing::info!(
            "All {} attempts rejected, using fallback question",
            config.generation.max_attempts
        );

        let result = GenerationResult {
            id: Uuid::new_v4().to_string(),
            question: config.fallback_question(history_size).to_string(),
            prompt: build_prompt_template(&theme, &opening_word),
            theme,
            opening_word,
            embedding: None,
            attempts: config.generation.max_attempts,
            rejected,
            created_at: Utc::now(),
            from_fallback: true,
        };
        self.remember(result.to_history_item().into()).await?;
        Ok(result)
    }

    /// Run the cleaning step and every enabled gate over one raw candidate
    async fn evaluate(
        &self,
        config: &PipelineConfig,
        raw: &str,
        working: &mut [HistoryItem],
        embedder: Option<&dyn EmbeddingProvider>,
    ) -> Verdict {
        let question = clean_question(raw);
        if question.is_empty() {
            return Verdict::Rejected(Rejection::EmptyOutput);
        }

        let words = tokens(&question).len();
        if words > config.generation.max_words {
            return Verdict::Rejected(Rejection::WordLimit { words, question });
        }

        if config.steps.ban_list {
            if let Some(banned) = config.find_banned_term(&question) {
                return Verdict::Rejected(Rejection::BannedTerm {
                    banned: banned.to_string(),
                    question,
                });
            }
        }

        if config.steps.string_similarity {
            if let Some(duplicate) = config.find_string_duplicate(&question, working) {
                return Verdict::Rejected(Rejection::StringSimilarity {
                    score: duplicate.score,
                    matched: duplicate.matched,
                    question,
                });
            }
        }

        let mut embedding = None;
        if let Some(embedder) = embedder {
            let candidate = match embedder.embed_one(&question).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    tracing::warn!("Embedding failed for candidate: {}", e);
                    return Verdict::Rejected(Rejection::EmbeddingError {
                        detail: e.to_string(),
                        question,
                    });
                }
            };

            let scan = config
                .find_embedding_duplicate(&candidate, working, embedder)
                .await;
            // Cache backfilled embeddings for the rest of this call only
            for (index, vector) in scan.backfilled {
                working[index].embedding = Some(vector);
            }

            if let Some(duplicate) = scan.duplicate {
                return Verdict::Rejected(Rejection::EmbeddingSimilarity {
                    score: duplicate.score,
                    matched: duplicate.matched,
                    question,
                });
            }
            embedding = Some(candidate);
        }

        Verdict::Accepted {
            question,
            embedding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfigBuilder;
    use crate::embedding::HashEmbeddingProvider;
    use crate::error::JournalError;
    use crate::generator::{ScriptedGenerator, ScriptedResponse};
    use async_trait::async_trait;

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn dimension(&self) -> usize {
            8
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(JournalError::Embedding("service unavailable".into()))
        }
    }

    async fn pipeline_with(patch: PipelineConfigPatch, seed: &[&str]) -> PromptPipeline {
        let pipeline = PromptPipeline::in_memory(&patch).await.unwrap();
        pipeline
            .set_history(seed.iter().map(|t| NewHistoryItem::new(*t)).collect())
            .await
            .unwrap();
        pipeline
    }

    #[test]
    fn test_clean_question() {
        assert_eq!(
            clean_question("Question: what did you learn today???"),
            "what did you learn today???"
        );
        assert_eq!(
            clean_question("\n\n  1) \"Why do you still carry that fear.\"\nextra line"),
            "Why do you still carry that fear?"
        );
        assert_eq!(
            clean_question("- When   did you   last feel brave"),
            "When did you last feel brave?"
        );
        assert_eq!(clean_question("QUESTION:   Who are you?"), "Who are you?");
        assert_eq!(clean_question("..."), "");
        assert_eq!(clean_question("  \n \n"), "");
    }

    #[test]
    fn test_prompt_template() {
        assert_eq!(
            build_prompt_template("fear", "Why"),
            "Theme: fear | Start with: Why"
        );
    }

    #[test]
    fn test_banned_terms_are_normalized() {
        let config = PipelineConfig::default()
            .merge(&PipelineConfigBuilder::new().banned_terms(["Small-Thing"]).build());
        assert_eq!(
            config.find_banned_term("Which SMALL thing mattered?"),
            Some("Small-Thing")
        );
        assert_eq!(config.find_banned_term("Which big thing mattered?"), None);
    }

    #[test]
    fn test_string_similarity_respects_enabled_metrics() {
        let none = PipelineConfig::default()
            .merge(&PipelineConfigBuilder::new().string_metrics(false, false, false).build());
        assert_eq!(none.string_similarity("same words", "same words"), 0.0);

        let jaccard_only = PipelineConfig::default()
            .merge(&PipelineConfigBuilder::new().string_metrics(true, false, false).build());
        assert_eq!(jaccard_only.string_similarity("a b", "b c"), jaccard("a b", "b c"));
    }

    #[tokio::test]
    async fn test_repeated_duplicate_exhausts_to_fallback() {
        let duplicate = "Who helped you most when you felt stuck?";
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[duplicate]).await;
        let generator = ScriptedGenerator::repeating(duplicate);

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert!(result.from_fallback);
        assert_eq!(result.attempts, 5);
        assert_eq!(result.rejected.len(), 5);
        assert!(result
            .rejected
            .iter()
            .all(|r| r.reason() == "string_similarity"));
        // One item in history selects the second fallback question
        assert_eq!(
            result.question,
            "How did one hard season quietly strengthen your character?"
        );
        assert_eq!(pipeline.history().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_banned_term_rejected_before_success() {
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[]).await;
        let generator = ScriptedGenerator::new([
            "Question: what did you learn today???",
            "Why does failure still shape your plans?",
        ]);

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert!(!result.from_fallback);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.rejection_reasons(), vec!["banned_term"]);
        assert!(matches!(
            &result.rejected[0],
            Rejection::BannedTerm { banned, .. } if banned == "today"
        ));
        assert_eq!(result.question, "Why does failure still shape your plans?");
    }

    #[tokio::test]
    async fn test_clean_candidate_accepted_first_try() {
        let pipeline = pipeline_with(
            PipelineConfigPatch::new(),
            &["Who taught you patience as a child?"],
        )
        .await;
        let before = pipeline.history().await.unwrap().len();
        let generator =
            ScriptedGenerator::new(["How did one hard season quietly strengthen your character"]);

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert_eq!(
            result.question,
            "How did one hard season quietly strengthen your character?"
        );
        assert_eq!(result.attempts, 1);
        assert!(!result.from_fallback);
        assert!(result.rejected.is_empty());

        let history = pipeline.history().await.unwrap();
        assert_eq!(history.len(), before + 1);
        let stored = history.last().unwrap();
        assert_eq!(stored.id, result.id);
        assert_eq!(stored.prompt, result.prompt);
    }

    #[tokio::test]
    async fn test_soft_failures_are_recorded_in_order() {
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[]).await;
        let too_long = "Why ".to_string() + &"really ".repeat(20) + "now?";
        let generator = ScriptedGenerator::from_responses([
            ScriptedResponse::Fail("model offline".into()),
            ScriptedResponse::Text("  \n  ".into()),
            ScriptedResponse::Text(too_long),
            ScriptedResponse::Text("Who do you become when nobody watches?".into()),
        ]);

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert_eq!(
            result.rejection_reasons(),
            vec!["generation_error", "empty_output", "word_limit"]
        );
        assert!(matches!(
            &result.rejected[2],
            Rejection::WordLimit { words: 22, .. }
        ));
        assert_eq!(result.attempts, 4);
        assert!(!result.from_fallback);
    }

    #[tokio::test]
    async fn test_word_limit_boundary() {
        let patch = PipelineConfigBuilder::new().max_words(6).build();
        let pipeline = pipeline_with(patch, &[]).await;
        let generator = ScriptedGenerator::new([
            "Who taught you to notice small kindnesses?",
            "Who taught you to notice kindness?",
        ]);

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert_eq!(result.rejection_reasons(), vec!["word_limit"]);
        assert!(matches!(
            &result.rejected[0],
            Rejection::WordLimit { words: 7, .. }
        ));
        assert_eq!(result.question, "Who taught you to notice kindness?");
        assert_eq!(result.attempts, 2);
    }

    #[tokio::test]
    async fn test_rotation_indices() {
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[]).await;
        let generator = ScriptedGenerator::new(Vec::<String>::new());

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();
        assert!(result.from_fallback);

        let contexts = generator.contexts();
        assert_eq!(contexts.len(), 5);
        // attempt 0: theme[0], word[0]; attempt 1: theme[1], word[(1 * 3 + 1) % 5]
        assert_eq!(contexts[0].theme, "childhood");
        assert_eq!(contexts[0].opening_word, "When");
        assert_eq!(contexts[1].theme, "failure");
        assert_eq!(contexts[1].opening_word, "What");
        assert_eq!(contexts[1].prompt, "Theme: failure | Start with: What");

        // Fallback uses the bare history size as index
        assert_eq!(result.theme, "childhood");
        assert_eq!(result.opening_word, "When");
        assert_eq!(
            result.question,
            "What memory still teaches you who you want to become?"
        );
    }

    #[tokio::test]
    async fn test_rotation_disabled_uses_fixed_context() {
        let patch = PipelineConfigBuilder::new().enable_rotation(false).build();
        let pipeline = pipeline_with(patch, &["Why?"]).await;
        let generator = ScriptedGenerator::new(["When did you last rest deeply?"]);

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert_eq!(result.theme, "personal growth");
        assert_eq!(result.opening_word, "What");
        assert_eq!(result.prompt, "Theme: personal growth | Start with: What");
    }

    #[tokio::test]
    async fn test_rotation_disabled_fallback_still_rotates() {
        let patch = PipelineConfigBuilder::new().enable_rotation(false).build();
        let pipeline = pipeline_with(patch, &[]).await;
        let generator = ScriptedGenerator::new(Vec::<String>::new());

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert!(result.from_fallback);
        assert_eq!(result.theme, "childhood");
        assert_eq!(result.opening_word, "When");
        assert_eq!(result.prompt, "Theme: childhood | Start with: When");

        // Attempts themselves kept the fixed context
        assert!(generator
            .contexts()
            .iter()
            .all(|c| c.theme == "personal growth" && c.opening_word == "What"));
    }

    #[tokio::test]
    async fn test_external_history_dedupes_without_storing() {
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[]).await;
        let external = vec![HistoryItem::new("Why does money make you anxious?")];
        let generator = ScriptedGenerator::new([
            "Why does money make you anxious?",
            "Who showed you what loyalty means?",
        ]);

        let result = pipeline
            .generate(GenerateRequest::new(&generator).with_external_history(external))
            .await
            .unwrap();

        assert_eq!(result.rejection_reasons(), vec!["string_similarity"]);
        let history = pipeline.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "Who showed you what loyalty means?");
    }

    #[tokio::test]
    async fn test_embedding_gate_rejects_near_duplicates() {
        let patch = PipelineConfigBuilder::new()
            .enable_string_similarity(false)
            .enable_embedding_similarity(true)
            .build();
        let pipeline = pipeline_with(patch, &["What fear still shapes your choices"]).await;
        let embedder = HashEmbeddingProvider::default();
        let generator = ScriptedGenerator::new([
            "What fear still shapes your choices now?",
            "Who taught you to rest?",
        ]);

        let result = pipeline
            .generate(GenerateRequest::new(&generator).with_embedder(&embedder))
            .await
            .unwrap();

        assert_eq!(result.rejection_reasons(), vec!["embedding_similarity"]);
        assert_eq!(result.question, "Who taught you to rest?");
        assert!(result.embedding.is_some());

        // Backfilled embeddings stay in the per-call working copy
        let history = pipeline.history().await.unwrap();
        assert!(history[0].embedding.is_none());
        assert!(history[1].embedding.is_some());
    }

    #[tokio::test]
    async fn test_embedding_gate_needs_provider_and_toggle() {
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[]).await;
        let embedder = HashEmbeddingProvider::default();
        let generator = ScriptedGenerator::new(["Who taught you to rest?"]);

        // Toggle is off by default, so the provider is ignored
        let result = pipeline
            .generate(GenerateRequest::new(&generator).with_embedder(&embedder))
            .await
            .unwrap();
        assert!(result.embedding.is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure_becomes_rejection() {
        let patch = PipelineConfigBuilder::new()
            .enable_embedding_similarity(true)
            .max_attempts(2)
            .build();
        let pipeline = pipeline_with(patch, &[]).await;
        let generator = ScriptedGenerator::repeating("Who taught you to rest?");

        let result = pipeline
            .generate(GenerateRequest::new(&generator).with_embedder(&FailingEmbedder))
            .await
            .unwrap();

        assert!(result.from_fallback);
        assert_eq!(
            result.rejection_reasons(),
            vec!["embedding_error", "embedding_error"]
        );
    }

    #[tokio::test]
    async fn test_zero_attempts_goes_straight_to_fallback() {
        let patch = PipelineConfigBuilder::new()
            .max_attempts(0)
            .fallback_questions(Vec::<String>::new())
            .build();
        let pipeline = pipeline_with(patch, &[]).await;
        let generator = ScriptedGenerator::repeating("unused");

        let result = pipeline
            .generate(GenerateRequest::new(&generator))
            .await
            .unwrap();

        assert!(result.from_fallback);
        assert_eq!(result.attempts, 0);
        assert_eq!(result.question, GENERIC_FALLBACK_QUESTION);
        assert!(generator.contexts().is_empty());
    }

    #[tokio::test]
    async fn test_update_config_truncates_history() {
        let pipeline = pipeline_with(
            PipelineConfigPatch::new(),
            &["one?", "two?", "three?", "four?"],
        )
        .await;

        pipeline
            .update_config(&PipelineConfigBuilder::new().history_limit(2).build())
            .await
            .unwrap();

        let texts: Vec<_> = pipeline
            .history()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.text)
            .collect();
        assert_eq!(texts, vec!["three?", "four?"]);
        assert_eq!(pipeline.config().await.history.limit, 2);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_up_front() {
        let patch = PipelineConfigBuilder::new().string_threshold(2.0).build();
        assert!(matches!(
            PromptPipeline::in_memory(&patch).await,
            Err(JournalError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_remember_ignores_blank_text() {
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[]).await;
        assert!(pipeline
            .remember(NewHistoryItem::new("   "))
            .await
            .unwrap()
            .is_none());
        assert!(pipeline.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remember_question_skips_repeat_of_latest() {
        let pipeline = pipeline_with(PipelineConfigPatch::new(), &[]).await;

        let stored = pipeline
            .remember_question(
                " Why does fear linger? ",
                "Theme: fear | Start with: Why",
                None,
            )
            .await
            .unwrap();
        assert!(stored);

        let repeated = pipeline
            .remember_question("why does FEAR linger?", "", None)
            .await
            .unwrap();
        assert!(!repeated);

        let history = pipeline.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "Why does fear linger?");
        assert_eq!(history[0].theme, "fear");
        assert_eq!(history[0].opening_word, "Why");
    }
}
