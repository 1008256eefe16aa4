//! Gratitude CLI - Command line interface for the journal core
//!
//! Usage:
//!   gratitude prompt -c "text" ...      Run the pipeline over scripted candidates
//!   gratitude history                   List remembered questions
//!   gratitude remember "question"       Remember an answered question
//!   gratitude hydrate entries.json      Rebuild history from journal entries
//!   gratitude analyze entries.json      Score a journal
//!   gratitude similarity "a" "b"        Compare two questions
//!   gratitude config                    Show the effective configuration

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use gratitude::{
    history_from_entries, GenerationResult, HashEmbeddingProvider, HistoryItem, JournalEntry,
    JournalSystem, PipelineConfig, PipelineConfigBuilder, PipelineConfigPatch, Rejection,
    ScriptedGenerator, SimilarityScores,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gratitude")]
#[command(about = "Gratitude - reflection prompts without repeats, plus journal analytics")]
#[command(version)]
struct Cli {
    /// Path to data directory
    #[arg(short, long, default_value = "./gratitude_data", env = "GRATITUDE_DATA_DIR")]
    data_dir: PathBuf,

    /// Keep history in memory only
    #[arg(long)]
    memory: bool,

    /// JSON file with a partial pipeline configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a question from scripted candidates
    Prompt {
        /// Candidate text, tried in order
        #[arg(short = 'c', long = "candidate", required = true)]
        candidates: Vec<String>,

        /// Enable the embedding-similarity gate with the hash embedder
        #[arg(short, long)]
        embed: bool,

        /// Journal entries whose questions also count as history
        #[arg(long)]
        entries: Option<PathBuf>,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List remembered questions
    History {
        /// Maximum results (newest first)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Remember a question that was answered
    Remember {
        /// Question text
        question: String,

        /// Prompt template it was generated from
        #[arg(short, long, default_value = "")]
        prompt: String,
    },

    /// Replace history with the questions found in journal entries
    Hydrate {
        /// JSON array of journal entries
        entries: PathBuf,
    },

    /// Score a journal
    Analyze {
        /// JSON array of journal entries
        entries: PathBuf,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare two questions
    Similarity { a: String, b: String },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let patch = load_patch(cli.config.as_deref())?;

    match cli.command {
        Commands::Prompt {
            candidates,
            embed,
            entries,
            json,
        } => {
            let system = open_system(&cli.data_dir, cli.memory, &patch).await?;
            cmd_prompt(system, candidates, embed, entries, json).await
        }
        Commands::History { limit } => {
            let system = open_system(&cli.data_dir, cli.memory, &patch).await?;
            cmd_history(&system, limit).await
        }
        Commands::Remember { question, prompt } => {
            let system = open_system(&cli.data_dir, cli.memory, &patch).await?;
            cmd_remember(&system, question, prompt).await
        }
        Commands::Hydrate { entries } => {
            let system = open_system(&cli.data_dir, cli.memory, &patch).await?;
            cmd_hydrate(&system, &entries).await
        }
        Commands::Analyze { entries, json } => cmd_analyze(&entries, json),
        Commands::Similarity { a, b } => cmd_similarity(&a, &b, &patch),
        Commands::Config => cmd_config(&patch),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "warn,gratitude=debug"
    } else {
        "warn,gratitude=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_patch(path: Option<&Path>) -> anyhow::Result<PipelineConfigPatch> {
    let Some(path) = path else {
        return Ok(PipelineConfigPatch::new());
    };

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {:?}", path))?;
    Ok(PipelineConfigPatch::from_json(&json)?)
}

fn load_entries(path: &Path) -> anyhow::Result<Vec<JournalEntry>> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read entries {:?}", path))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid entries file {:?}", path))
}

async fn open_system(
    data_dir: &Path,
    memory: bool,
    patch: &PipelineConfigPatch,
) -> anyhow::Result<JournalSystem> {
    let system = if memory {
        JournalSystem::in_memory(patch).await?
    } else {
        JournalSystem::open(data_dir, patch).await?
    };
    Ok(system)
}

async fn cmd_prompt(
    system: JournalSystem,
    candidates: Vec<String>,
    embed: bool,
    entries: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let system = if embed {
        system
            .pipeline()
            .update_config(
                &PipelineConfigBuilder::new()
                    .enable_embedding_similarity(true)
                    .build(),
            )
            .await?;
        system.with_embedder(Arc::new(HashEmbeddingProvider::default()))
    } else {
        system
    };

    let external: Vec<HistoryItem> = match entries {
        Some(path) => {
            let limit = system.pipeline().config().await.history_limit();
            history_from_entries(&load_entries(&path)?, limit)
                .into_iter()
                .filter_map(|item| item.into_item())
                .collect()
        }
        None => Vec::new(),
    };

    let generator = ScriptedGenerator::new(candidates);
    let result = system.generate(&generator, external).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    print_result(&result);
    Ok(())
}

fn print_result(result: &GenerationResult) {
    if result.from_fallback {
        println!("{}", "All candidates rejected, using fallback".yellow());
    } else {
        println!("{}", "Question accepted".green().bold());
    }

    println!("  {}", result.question.bold());
    println!("  Theme:        {}", result.theme.cyan());
    println!("  Start with:   {}", result.opening_word.cyan());
    println!("  Attempts:     {}", result.attempts);

    if !result.rejected.is_empty() {
        println!("\n{}", "Rejected:".bold());
        for (i, rejection) in result.rejected.iter().enumerate() {
            println!("  {}. {}", i + 1, describe_rejection(rejection));
        }
    }
}

fn describe_rejection(rejection: &Rejection) -> String {
    let reason = rejection.reason().red();
    match rejection {
        Rejection::GenerationError { detail } => format!("{} {}", reason, detail.dimmed()),
        Rejection::EmptyOutput => reason.to_string(),
        Rejection::WordLimit { words, question } => {
            format!("{} ({} words) {}", reason, words, question)
        }
        Rejection::BannedTerm { banned, question } => {
            format!("{} [{}] {}", reason, banned.yellow(), question)
        }
        Rejection::StringSimilarity {
            score,
            matched,
            question,
        }
        | Rejection::EmbeddingSimilarity {
            score,
            matched,
            question,
        } => format!(
            "{} {:.2} {}\n       matches: {}",
            reason,
            score,
            question,
            matched.dimmed()
        ),
        Rejection::EmbeddingError { detail, question } => {
            format!("{} {} {}", reason, question, detail.dimmed())
        }
    }
}

async fn cmd_history(system: &JournalSystem, limit: usize) -> anyhow::Result<()> {
    let history = system.pipeline().history().await?;

    if history.is_empty() {
        println!("{}", "No questions remembered yet".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("{} remembered question(s)", history.len()).bold()
    );
    println!();

    for item in history.iter().rev().take(limit) {
        println!(
            "  {} {}",
            item.created_at.format("%Y-%m-%d").to_string().dimmed(),
            item.text
        );
        if !item.theme.is_empty() {
            println!("             {} / {}", item.theme.cyan(), item.opening_word.cyan());
        }
    }

    Ok(())
}

async fn cmd_remember(
    system: &JournalSystem,
    question: String,
    prompt: String,
) -> anyhow::Result<()> {
    let stored = system
        .pipeline()
        .remember_question(&question, &prompt, None)
        .await?;

    if stored {
        println!("{}", "Question remembered".green());
    } else {
        println!("{}", "Skipped (blank or same as the latest question)".yellow());
    }
    Ok(())
}

async fn cmd_hydrate(system: &JournalSystem, path: &Path) -> anyhow::Result<()> {
    let entries = load_entries(path)?;
    let count = system.hydrate(&entries).await?;

    println!(
        "{}",
        format!("Loaded {} question(s) from {} entries", count, entries.len()).green()
    );
    Ok(())
}

fn cmd_analyze(path: &Path, json: bool) -> anyhow::Result<()> {
    let entries = load_entries(path)?;
    let report = gratitude::analyze(&entries);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Journal Analytics".bold().underline());
    for line in report.summary_text().lines() {
        println!("  {}", line);
    }

    if report.window.total_entries > 0 {
        println!(
            "\n  Quests: {}/{} complete",
            report.gamification.completed_quests, report.gamification.total_quests
        );
        if let Some(next) = report.quests.iter().find(|q| !q.done) {
            println!(
                "  Next:   {} ({}/{}, +{} XP)",
                next.title.cyan(),
                next.progress,
                next.target,
                next.reward_xp
            );
        }
    }

    Ok(())
}

fn cmd_similarity(a: &str, b: &str, patch: &PipelineConfigPatch) -> anyhow::Result<()> {
    let scores = SimilarityScores::between(a, b);
    let (score, duplicate) = similarity_verdict(a, b, patch)?;

    println!("  Jaccard:     {:.3}", scores.jaccard);
    println!("  Dice:        {:.3}", scores.dice);
    println!("  Levenshtein: {:.3}", scores.levenshtein);

    let shown = format!("{:.3}", score);
    if duplicate {
        println!("  Max:         {} {}", shown.red(), "(duplicate)".red());
    } else {
        println!("  Max:         {}", shown.green());
    }
    Ok(())
}

/// Score over the enabled metrics, and whether the string gate would reject it
fn similarity_verdict(
    a: &str,
    b: &str,
    patch: &PipelineConfigPatch,
) -> anyhow::Result<(f64, bool)> {
    let config = PipelineConfig::default().merge(patch);
    config.validate()?;
    let score = config.string_similarity(a, b);
    Ok((score, score >= config.similarity.string_threshold))
}

fn cmd_config(patch: &PipelineConfigPatch) -> anyhow::Result<()> {
    let config = PipelineConfig::default().merge(patch);
    config.validate()?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
