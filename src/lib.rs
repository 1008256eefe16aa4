//! # Gratitude - Journal prompts without repeats, and journal analytics
//!
//! Two cores:
//! - [`PromptPipeline`]: asks a [`CandidateGenerator`] for a reflection
//!   question, rejects repeats and policy violations against a rolling
//!   [`HistoryStore`], and falls back to a pre-authored question when every
//!   attempt is rejected.
//! - [`analyze`]: scores a list of [`JournalEntry`] values (streaks, writing
//!   depth, sentiment, themes, quests).
//!
//! [`JournalSystem`] wires both together over a SQLite-backed history.

pub mod analytics;
pub mod config;
pub mod embedding;
pub mod error;
pub mod generator;
pub mod history;
pub mod lexicon;
pub mod pipeline;
pub mod provenance;
pub mod quests;
pub mod similarity;
pub mod store;
pub mod types;

pub use analytics::{analyze, AnalyticsReport, Level, ThemeCount};
pub use config::{
    merge_config, PipelineConfig, PipelineConfigBuilder, PipelineConfigPatch,
    GENERIC_FALLBACK_QUESTION,
};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider};
pub use error::{JournalError, Result};
pub use generator::{
    CandidateContext, CandidateGenerator, FnGenerator, ScriptedGenerator, ScriptedResponse,
};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use pipeline::{build_prompt_template, clean_question, GenerateRequest, PromptPipeline};
pub use provenance::{
    history_from_entries, looks_like_prompt_meta, normalize_prompt_fields, parse_prompt_meta,
    PromptFields, PromptMeta,
};
pub use quests::{evaluate_quests, quest_catalog, MetricSnapshot, Quest, QuestDefinition};
pub use similarity::{
    cosine, dice, jaccard, levenshtein_distance, levenshtein_similarity, normalize_text,
    SimilarityScores,
};
pub use store::SqliteHistoryStore;
pub use types::{GenerationResult, HistoryItem, JournalEntry, NewHistoryItem, Rejection};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Prompt pipeline plus its history backend, constructed once per process
#[derive(Clone)]
pub struct JournalSystem {
    pipeline: Arc<PromptPipeline>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    data_dir: Option<PathBuf>,
}

impl std::fmt::Debug for JournalSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalSystem")
            .field("data_dir", &self.data_dir)
            .field("embedder", &self.embedder.as_ref().map(|e| e.name()))
            .finish()
    }
}

impl JournalSystem {
    /// Open a system whose history lives in `data_dir/history.db`
    pub async fn open(data_dir: impl AsRef<Path>, patch: &PipelineConfigPatch) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let limit = PipelineConfig::default().merge(patch).history_limit();
        let store = SqliteHistoryStore::open(&data_dir, limit).await?;
        let pipeline = PromptPipeline::new(patch, Arc::new(store)).await?;

        tracing::debug!("Opened journal history in {:?}", data_dir);
        Ok(Self {
            pipeline: Arc::new(pipeline),
            embedder: None,
            data_dir: Some(data_dir),
        })
    }

    /// A system with process-local history only
    pub async fn in_memory(patch: &PipelineConfigPatch) -> Result<Self> {
        Ok(Self {
            pipeline: Arc::new(PromptPipeline::in_memory(patch).await?),
            embedder: None,
            data_dir: None,
        })
    }

    /// Use `embedder` for the embedding-similarity gate
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn pipeline(&self) -> &PromptPipeline {
        &self.pipeline
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Generate a question, checking `external` history alongside the store
    pub async fn generate(
        &self,
        generator: &dyn CandidateGenerator,
        external: Vec<HistoryItem>,
    ) -> Result<GenerationResult> {
        let mut request = GenerateRequest::new(generator).with_external_history(external);
        if let Some(embedder) = &self.embedder {
            request = request.with_embedder(embedder.as_ref());
        }
        self.pipeline.generate(request).await
    }

    /// Record the question a saved entry answered
    pub async fn record_entry(&self, entry: &JournalEntry) -> Result<bool> {
        let fields = normalize_prompt_fields(&entry.reflection_prompt, &entry.reflection_question);
        self.pipeline
            .remember_question(&fields.question, &fields.prompt, None)
            .await
    }

    /// Replace history with the questions found in stored entries
    pub async fn hydrate(&self, entries: &[JournalEntry]) -> Result<usize> {
        let limit = self.pipeline.config().await.history_limit();
        let items = history_from_entries(entries, limit);
        let count = items.len();
        self.pipeline.set_history(items).await?;

        tracing::info!("Prompt history loaded: {} question(s)", count);
        Ok(count)
    }

    /// Score entries; see [`analytics::analyze`]
    pub fn analyze(&self, entries: &[JournalEntry]) -> AnalyticsReport {
        analyze(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_persists_history() {
        let dir = tempfile::tempdir().unwrap();
        {
            let system = JournalSystem::open(dir.path(), &PipelineConfigPatch::new())
                .await
                .unwrap();
            let generator = ScriptedGenerator::new(["Who taught you to rest?"]);
            let result = system.generate(&generator, Vec::new()).await.unwrap();
            assert!(!result.from_fallback);
        }

        let reopened = JournalSystem::open(dir.path(), &PipelineConfigPatch::new())
            .await
            .unwrap();
        let history = reopened.pipeline().history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "Who taught you to rest?");
    }

    #[tokio::test]
    async fn test_hydrate_then_record_entry() {
        let system = JournalSystem::in_memory(&PipelineConfigPatch::new())
            .await
            .unwrap();
        let entries = vec![
            JournalEntry::new("2024-01-01")
                .with_question("Why rest?", "Theme: health | Start with: Why"),
            JournalEntry::new("2024-01-02").with_question("Who helped?", ""),
        ];
        assert_eq!(system.hydrate(&entries).await.unwrap(), 2);

        // Same as the newest remembered question
        assert!(!system.record_entry(&entries[1]).await.unwrap());

        let fresh = JournalEntry::new("2024-01-03").with_question("", "When did you laugh?");
        assert!(system.record_entry(&fresh).await.unwrap());

        let history = system.pipeline().history().await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].text, "When did you laugh?");
        assert!(history[2].prompt.is_empty());
    }

    #[tokio::test]
    async fn test_embedder_enables_gate_when_configured() {
        let patch = PipelineConfigBuilder::new()
            .enable_embedding_similarity(true)
            .build();
        let system = JournalSystem::in_memory(&patch)
            .await
            .unwrap()
            .with_embedder(Arc::new(HashEmbeddingProvider::default()));

        let generator = ScriptedGenerator::new(["Who taught you to rest?"]);
        let result = system.generate(&generator, Vec::new()).await.unwrap();
        assert!(result.embedding.is_some());
    }
}
