//! Prompt pipeline configuration
//!
//! `PipelineConfig` is the fully-resolved configuration. Partial overrides are
//! expressed as a `PipelineConfigPatch` (every field optional) and applied with
//! a typed deep merge: present scalars and lists replace the base value,
//! absent fields keep it, nested sections merge field by field.

use crate::error::{JournalError, Result};
use serde::{Deserialize, Serialize};

/// Theme used when rotation is disabled or no themes are configured
pub const DEFAULT_THEME: &str = "personal growth";

/// Opening word used when rotation is disabled or no words are configured
pub const DEFAULT_OPENING_WORD: &str = "What";

/// Question used when the fallback list is empty
pub const GENERIC_FALLBACK_QUESTION: &str =
    "What part of your story deserves deeper reflection right now?";

/// Resolved pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub history: HistoryConfig,
    pub generation: GenerationConfig,
    pub steps: StepsConfig,
    pub rotation: RotationConfig,
    pub filters: FiltersConfig,
    pub similarity: SimilarityConfig,
    pub fallback_questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryConfig {
    /// Maximum remembered questions
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Retry budget per `generate` call
    pub max_attempts: usize,
    /// Candidates with more words are rejected
    pub max_words: usize,
}

/// Toggles for each generation/rejection stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepsConfig {
    pub rotation: bool,
    pub ban_list: bool,
    pub string_similarity: bool,
    pub embedding_similarity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationConfig {
    pub themes: Vec<String>,
    pub opening_words: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiltersConfig {
    /// Matched as substrings after normalization
    pub banned_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilarityConfig {
    pub string_threshold: f64,
    pub use_jaccard: bool,
    pub use_dice: bool,
    pub use_levenshtein: bool,
    pub embedding_threshold: f64,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            generation: GenerationConfig::default(),
            steps: StepsConfig::default(),
            rotation: RotationConfig::default(),
            filters: FiltersConfig::default(),
            similarity: SimilarityConfig::default(),
            fallback_questions: strings(&[
                "What memory still teaches you who you want to become?",
                "How did one hard season quietly strengthen your character?",
                "Why does a past challenge still shape your decisions now?",
                "When did you surprise yourself by choosing growth over comfort?",
                "Who helped you change when you were close to giving up?",
            ]),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 50 }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_words: 18,
        }
    }
}

impl Default for StepsConfig {
    fn default() -> Self {
        Self {
            rotation: true,
            ban_list: true,
            string_similarity: true,
            embedding_similarity: false, // Needs an embedding provider
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            themes: strings(&[
                "childhood",
                "failure",
                "future self",
                "health",
                "money",
                "identity",
                "fear",
                "friendship",
                "discipline",
                "loneliness",
                "family",
                "regret",
            ]),
            opening_words: strings(&["When", "Who", "Why", "How", "What"]),
        }
    }
}

impl Default for FiltersConfig {
    fn default() -> Self {
        Self {
            banned_terms: strings(&["today", "small thing", "grateful", "appreciate"]),
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            string_threshold: 0.75,
            use_jaccard: true,
            use_dice: true,
            use_levenshtein: true,
            embedding_threshold: 0.85,
        }
    }
}

impl PipelineConfig {
    /// Deep-merge a patch over this config, returning the merged config
    pub fn merge(&self, patch: &PipelineConfigPatch) -> Self {
        let mut merged = self.clone();

        if let Some(history) = &patch.history {
            set(&mut merged.history.limit, history.limit);
        }
        if let Some(generation) = &patch.generation {
            set(&mut merged.generation.max_attempts, generation.max_attempts);
            set(&mut merged.generation.max_words, generation.max_words);
        }
        if let Some(steps) = &patch.steps {
            set(&mut merged.steps.rotation, steps.rotation);
            set(&mut merged.steps.ban_list, steps.ban_list);
            set(&mut merged.steps.string_similarity, steps.string_similarity);
            set(&mut merged.steps.embedding_similarity, steps.embedding_similarity);
        }
        if let Some(rotation) = &patch.rotation {
            set_list(&mut merged.rotation.themes, &rotation.themes);
            set_list(&mut merged.rotation.opening_words, &rotation.opening_words);
        }
        if let Some(filters) = &patch.filters {
            set_list(&mut merged.filters.banned_terms, &filters.banned_terms);
        }
        if let Some(similarity) = &patch.similarity {
            set(&mut merged.similarity.string_threshold, similarity.string_threshold);
            set(&mut merged.similarity.use_jaccard, similarity.use_jaccard);
            set(&mut merged.similarity.use_dice, similarity.use_dice);
            set(&mut merged.similarity.use_levenshtein, similarity.use_levenshtein);
            set(
                &mut merged.similarity.embedding_threshold,
                similarity.embedding_threshold,
            );
        }
        set_list(&mut merged.fallback_questions, &patch.fallback_questions);

        merged
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("similarity.stringThreshold", self.similarity.string_threshold),
            ("similarity.embeddingThreshold", self.similarity.embedding_threshold),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(JournalError::Configuration(format!(
                    "{} must be within 0.0..=1.0, got {}",
                    name, value
                )));
            }
        }

        if self.generation.max_words == 0 {
            return Err(JournalError::Configuration(
                "generation.maxWords must be positive".into(),
            ));
        }

        Ok(())
    }

    /// Effective history capacity (never below one)
    pub fn history_limit(&self) -> usize {
        self.history.limit.max(1)
    }
}

fn set<T: Copy>(target: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *target = v;
    }
}

fn set_list(target: &mut Vec<String>, value: &Option<Vec<String>>) {
    if let Some(v) = value {
        *target = v.clone();
    }
}

/// Free-function form of [`PipelineConfig::merge`]
pub fn merge_config(base: &PipelineConfig, patch: &PipelineConfigPatch) -> PipelineConfig {
    base.merge(patch)
}

/// Partial configuration; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfigPatch {
    pub history: Option<HistoryPatch>,
    pub generation: Option<GenerationPatch>,
    pub steps: Option<StepsPatch>,
    pub rotation: Option<RotationPatch>,
    pub filters: Option<FiltersPatch>,
    pub similarity: Option<SimilarityPatch>,
    pub fallback_questions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryPatch {
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationPatch {
    pub max_attempts: Option<usize>,
    pub max_words: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepsPatch {
    pub rotation: Option<bool>,
    pub ban_list: Option<bool>,
    pub string_similarity: Option<bool>,
    pub embedding_similarity: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RotationPatch {
    pub themes: Option<Vec<String>>,
    pub opening_words: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FiltersPatch {
    pub banned_terms: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimilarityPatch {
    pub string_threshold: Option<f64>,
    pub use_jaccard: Option<bool>,
    pub use_dice: Option<bool>,
    pub use_levenshtein: Option<bool>,
    pub embedding_threshold: Option<f64>,
}

impl PipelineConfigPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a patch from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl From<PipelineConfig> for PipelineConfigPatch {
    fn from(config: PipelineConfig) -> Self {
        Self {
            history: Some(HistoryPatch {
                limit: Some(config.history.limit),
            }),
            generation: Some(GenerationPatch {
                max_attempts: Some(config.generation.max_attempts),
                max_words: Some(config.generation.max_words),
            }),
            steps: Some(StepsPatch {
                rotation: Some(config.steps.rotation),
                ban_list: Some(config.steps.ban_list),
                string_similarity: Some(config.steps.string_similarity),
                embedding_similarity: Some(config.steps.embedding_similarity),
            }),
            rotation: Some(RotationPatch {
                themes: Some(config.rotation.themes),
                opening_words: Some(config.rotation.opening_words),
            }),
            filters: Some(FiltersPatch {
                banned_terms: Some(config.filters.banned_terms),
            }),
            similarity: Some(SimilarityPatch {
                string_threshold: Some(config.similarity.string_threshold),
                use_jaccard: Some(config.similarity.use_jaccard),
                use_dice: Some(config.similarity.use_dice),
                use_levenshtein: Some(config.similarity.use_levenshtein),
                embedding_threshold: Some(config.similarity.embedding_threshold),
            }),
            fallback_questions: Some(config.fallback_questions),
        }
    }
}

/// Builder for pipeline config patches
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    patch: PipelineConfigPatch,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history_limit(mut self, limit: usize) -> Self {
        self.patch.history.get_or_insert_with(Default::default).limit = Some(limit);
        self
    }

    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.patch
            .generation
            .get_or_insert_with(Default::default)
            .max_attempts = Some(attempts);
        self
    }

    pub fn max_words(mut self, words: usize) -> Self {
        self.patch
            .generation
            .get_or_insert_with(Default::default)
            .max_words = Some(words);
        self
    }

    pub fn enable_rotation(mut self, enable: bool) -> Self {
        self.patch.steps.get_or_insert_with(Default::default).rotation = Some(enable);
        self
    }

    pub fn enable_ban_list(mut self, enable: bool) -> Self {
        self.patch.steps.get_or_insert_with(Default::default).ban_list = Some(enable);
        self
    }

    pub fn enable_string_similarity(mut self, enable: bool) -> Self {
        self.patch
            .steps
            .get_or_insert_with(Default::default)
            .string_similarity = Some(enable);
        self
    }

    pub fn enable_embedding_similarity(mut self, enable: bool) -> Self {
        self.patch
            .steps
            .get_or_insert_with(Default::default)
            .embedding_similarity = Some(enable);
        self
    }

    pub fn themes<I, S>(mut self, themes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch.rotation.get_or_insert_with(Default::default).themes =
            Some(themes.into_iter().map(Into::into).collect());
        self
    }

    pub fn opening_words<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch
            .rotation
            .get_or_insert_with(Default::default)
            .opening_words = Some(words.into_iter().map(Into::into).collect());
        self
    }

    pub fn banned_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch
            .filters
            .get_or_insert_with(Default::default)
            .banned_terms = Some(terms.into_iter().map(Into::into).collect());
        self
    }

    pub fn string_threshold(mut self, threshold: f64) -> Self {
        self.patch
            .similarity
            .get_or_insert_with(Default::default)
            .string_threshold = Some(threshold);
        self
    }

    pub fn embedding_threshold(mut self, threshold: f64) -> Self {
        self.patch
            .similarity
            .get_or_insert_with(Default::default)
            .embedding_threshold = Some(threshold);
        self
    }

    /// Choose which string metrics take part in the similarity gate
    pub fn string_metrics(mut self, jaccard: bool, dice: bool, levenshtein: bool) -> Self {
        let similarity = self.patch.similarity.get_or_insert_with(Default::default);
        similarity.use_jaccard = Some(jaccard);
        similarity.use_dice = Some(dice);
        similarity.use_levenshtein = Some(levenshtein);
        self
    }

    pub fn fallback_questions<I, S>(mut self, questions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch.fallback_questions = Some(questions.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> PipelineConfigPatch {
        self.patch
    }
}
