//! # Journal analytics
//!
//! `analyze` scores a list of journal entries along several gamified
//! heuristics: streaks, writing depth, sentiment drift, life-theme coverage
//! and a few composite scores built from them. It is a pure function of its
//! input apart from the informational `generated_at` timestamp.

use crate::lexicon::{detect_themes, is_negative, is_person, is_positive, THEMES};
use crate::quests::{evaluate_quests, quest_catalog, MetricSnapshot, Quest};
use crate::similarity::{normalize_text, tokens};
use crate::types::JournalEntry;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

static LIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").unwrap());

/// Entries averaged at each end of the timeline for the sentiment trend
const SENTIMENT_WINDOW: usize = 4;

/// Round half-up to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale + 0.5).floor() / scale
}

fn round_score(value: f64) -> u32 {
    round_to(value, 0).max(0.0) as u32
}

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn parse_date(date: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Split a gratitude list into items, dropping bullets, numbering and blanks
pub fn parse_grateful_items(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

/// Net sentiment per token; 0.0 for text without tokens
pub fn sentiment_signal(text: &str) -> f64 {
    let words = tokens(text);
    if words.is_empty() {
        return 0.0;
    }

    let positive = words.iter().filter(|w| is_positive(w)).count() as f64;
    let negative = words.iter().filter(|w| is_negative(w)).count() as f64;
    (positive - negative) / words.len() as f64
}

/// Tier awarded for a cooperation score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl Level {
    pub fn from_score(score: u32) -> Self {
        if score >= 85 {
            Level::Diamond
        } else if score >= 70 {
            Level::Gold
        } else if score >= 55 {
            Level::Silver
        } else {
            Level::Bronze
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Level::Bronze => "Bronze",
            Level::Silver => "Silver",
            Level::Gold => "Gold",
            Level::Diamond => "Diamond",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportWindow {
    pub total_entries: u32,
    pub active_days: u32,
    pub span_days: u32,
    pub first_date: String,
    pub last_date: String,
}

/// Composite scores, all 0-100
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub cooperation: u32,
    pub defection_risk: u32,
    pub exploration: u32,
    pub nash_balance: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Streaks {
    pub current: u32,
    pub longest: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WritingStats {
    pub reflection_avg_words: f64,
    pub feeling_avg_words: f64,
    pub grateful_avg_items: f64,
    pub vocabulary_diversity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentimentStats {
    pub first_window_score: f64,
    pub last_window_score: f64,
    pub trend: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeCount {
    pub theme: String,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeStats {
    /// Themes seen at least once, in table order
    pub covered: Vec<String>,
    /// Up to three most frequent themes
    pub top: Vec<ThemeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gamification {
    pub level: Level,
    pub xp: u32,
    pub completed_quests: u32,
    pub total_quests: u32,
}

/// Everything `analyze` reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub generated_at: DateTime<Utc>,
    pub window: ReportWindow,
    pub scores: Scores,
    pub streaks: Streaks,
    pub writing: WritingStats,
    pub sentiment: SentimentStats,
    pub themes: ThemeStats,
    pub gamification: Gamification,
    pub quests: Vec<Quest>,
}

impl AnalyticsReport {
    /// Report for an empty journal; every quest listed at zero progress
    pub fn empty() -> Self {
        Self {
            generated_at: Utc::now(),
            window: ReportWindow::default(),
            scores: Scores::default(),
            streaks: Streaks::default(),
            writing: WritingStats::default(),
            sentiment: SentimentStats::default(),
            themes: ThemeStats::default(),
            gamification: Gamification {
                level: Level::Bronze,
                xp: 0,
                completed_quests: 0,
                total_quests: quest_catalog().len() as u32,
            },
            quests: evaluate_quests(&MetricSnapshot::default()),
        }
    }

    /// Short plain-text digest
    pub fn summary_text(&self) -> String {
        if self.window.total_entries == 0 {
            return "No entries yet. Write your first journal entry to see your progress.".into();
        }

        let themes = if self.themes.top.is_empty() {
            "No clear pattern yet".to_string()
        } else {
            self.themes
                .top
                .iter()
                .map(|t| format!("{} ({})", t.theme, t.count))
                .collect::<Vec<_>>()
                .join(", ")
        };

        [
            format!("Entries: {}", self.window.total_entries),
            format!(
                "Level: {} ({} XP)",
                self.gamification.level, self.gamification.xp
            ),
            format!("Current streak: {} day(s)", self.streaks.current),
            format!("Cooperation score: {}", self.scores.cooperation),
            format!("Defection risk: {}", self.scores.defection_risk),
            format!("Top themes: {}", themes),
        ]
        .join("\n")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StreakStats {
    active_days: u32,
    span_days: u32,
    longest: u32,
    current: u32,
}

/// Streaks over unique dates. Unparseable dates count as active days but
/// never extend or break a run.
fn streak_stats<'a>(dates: impl IntoIterator<Item = &'a str>) -> StreakStats {
    let unique: Vec<&str> = dates
        .into_iter()
        .filter(|d| !d.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if unique.is_empty() {
        return StreakStats::default();
    }

    let parsed: Vec<Option<NaiveDate>> = unique.iter().map(|d| parse_date(d)).collect();
    let gap = |i: usize| match (parsed[i - 1], parsed[i]) {
        (Some(prev), Some(next)) => Some((next - prev).num_days()),
        _ => None,
    };

    let mut longest = 1;
    let mut running = 1;
    for i in 1..parsed.len() {
        match gap(i) {
            Some(1) => running += 1,
            Some(g) if g > 1 => running = 1,
            _ => {}
        }
        longest = longest.max(running);
    }

    let mut current = 1;
    for i in (1..parsed.len()).rev() {
        match gap(i) {
            Some(1) => current += 1,
            Some(g) if g > 1 => break,
            _ => {}
        }
    }

    let span_days = match (parsed[0], parsed[parsed.len() - 1]) {
        (Some(first), Some(last)) => ((last - first).num_days() + 1).max(1) as u32,
        _ => 1,
    };

    StreakStats {
        active_days: unique.len() as u32,
        span_days,
        longest,
        current,
    }
}

/// Score a journal
pub fn analyze(entries: &[JournalEntry]) -> AnalyticsReport {
    let mut entries: Vec<&JournalEntry> = entries.iter().filter(|e| e.dated().is_some()).collect();
    entries.sort_by(|a, b| a.date.cmp(&b.date));

    if entries.is_empty() {
        return AnalyticsReport::empty();
    }
    let total = entries.len();
    tracing::debug!("Analyzing {} dated entries", total);

    let streak = streak_stats(entries.iter().filter_map(|e| e.dated()));
    let consistency_rate = streak.active_days as f64 / streak.span_days.max(1) as f64;

    // Writing
    let reflection_words: Vec<f64> = entries
        .iter()
        .map(|e| tokens(&e.reflection).len() as f64)
        .collect();
    let feeling_words: Vec<f64> = entries
        .iter()
        .map(|e| tokens(&e.feeling).len() as f64)
        .collect();
    let avg_reflection_words = average(&reflection_words);
    let avg_feeling_words = average(&feeling_words);
    let grateful_counts: Vec<f64> = entries
        .iter()
        .map(|e| parse_grateful_items(&e.grateful_for).len() as f64)
        .collect();
    let avg_grateful_items = average(&grateful_counts);

    let combined: Vec<String> = entries
        .iter()
        .map(|e| format!("{} {} {}", e.feeling, e.reflection, e.grateful_for))
        .collect();
    let all_tokens: Vec<String> = combined.iter().flat_map(|text| tokens(text)).collect();
    let vocabulary_diversity = if all_tokens.is_empty() {
        0.0
    } else {
        all_tokens.iter().collect::<HashSet<_>>().len() as f64 / all_tokens.len() as f64
    };

    // Social
    let people_mentions = entries
        .iter()
        .filter(|e| {
            tokens(&format!("{} {}", e.reflection, e.grateful_for))
                .iter()
                .any(|w| is_person(w))
        })
        .count();
    let people_rate = people_mentions as f64 / total as f64;

    // Sentiment
    let sentiments: Vec<f64> = entries
        .iter()
        .map(|e| sentiment_signal(&format!("{} {}", e.feeling, e.reflection)))
        .collect();
    let window = SENTIMENT_WINDOW.min(sentiments.len());
    let first_sentiment = average(&sentiments[..window]);
    let last_sentiment = average(&sentiments[sentiments.len() - window..]);
    let sentiment_trend = last_sentiment - first_sentiment;
    let trend_score = clamp_pct(50.0 + sentiment_trend * 500.0);

    // Themes
    let mut theme_counts = vec![0u32; THEMES.len()];
    for text in &combined {
        for theme in detect_themes(&normalize_text(text)) {
            if let Some(index) = THEMES.iter().position(|(name, _)| *name == theme) {
                theme_counts[index] += 1;
            }
        }
    }
    let covered: Vec<ThemeCount> = THEMES
        .iter()
        .zip(&theme_counts)
        .filter(|(_, count)| **count > 0)
        .map(|((theme, _), count)| ThemeCount {
            theme: theme.to_string(),
            count: *count,
        })
        .collect();
    let mut top = covered.clone();
    top.sort_by(|a, b| b.count.cmp(&a.count));
    top.truncate(3);
    let exploration_score = clamp_pct(covered.len() as f64 / THEMES.len() as f64 * 100.0);

    // Composite scores
    let consistency_score = consistency_rate * 100.0;
    let streak_score = clamp_pct(streak.current as f64 / 7.0 * 100.0);
    let depth_score = clamp_pct(avg_reflection_words / 45.0 * 100.0);
    let gratitude_breadth_score = clamp_pct(avg_grateful_items / 5.0 * 100.0);
    let social_score = clamp_pct(people_rate * 100.0);

    let cooperation = round_score(
        0.28 * consistency_score
            + 0.24 * streak_score
            + 0.18 * depth_score
            + 0.15 * gratitude_breadth_score
            + 0.15 * social_score,
    );
    let defection_risk = round_score(clamp_pct(
        100.0
            - (0.35 * consistency_score
                + 0.20 * streak_score
                + 0.20 * depth_score
                + 0.15 * gratitude_breadth_score
                + 0.10 * trend_score),
    ));
    let nash_balance = round_score(
        0.5 * cooperation as f64
            + 0.25 * exploration_score
            + 0.25 * (100.0 - defection_risk as f64),
    );

    // Quests
    let metrics = MetricSnapshot {
        current_streak: streak.current,
        total_entries: total as u32,
        reflection_avg_words: avg_reflection_words,
        consistency_rate_pct: consistency_rate * 100.0,
        themes_covered: covered.len() as u32,
        cooperation,
        active_days: streak.active_days,
    };
    let quests = evaluate_quests(&metrics);
    let completed_quests = quests.iter().filter(|q| q.done).count() as u32;

    let xp = total as u32 * 15
        + streak.longest * 10
        + round_score(cooperation as f64 * 1.5)
        + round_score(exploration_score)
        + completed_quests * 8;

    AnalyticsReport {
        generated_at: Utc::now(),
        window: ReportWindow {
            total_entries: total as u32,
            active_days: streak.active_days,
            span_days: streak.span_days,
            first_date: entries[0].date.clone().unwrap_or_default(),
            last_date: entries[total - 1].date.clone().unwrap_or_default(),
        },
        scores: Scores {
            cooperation,
            defection_risk,
            exploration: round_score(exploration_score),
            nash_balance,
        },
        streaks: Streaks {
            current: streak.current,
            longest: streak.longest,
        },
        writing: WritingStats {
            reflection_avg_words: round_to(avg_reflection_words, 1),
            feeling_avg_words: round_to(avg_feeling_words, 1),
            grateful_avg_items: round_to(avg_grateful_items, 1),
            vocabulary_diversity: round_to(vocabulary_diversity, 3),
        },
        sentiment: SentimentStats {
            first_window_score: round_to(first_sentiment, 3),
            last_window_score: round_to(last_sentiment, 3),
            trend: round_to(sentiment_trend, 3),
        },
        themes: ThemeStats {
            covered: covered.into_iter().map(|t| t.theme).collect(),
            top,
        },
        gamification: Gamification {
            level: Level::from_score(cooperation),
            xp,
            completed_quests,
            total_quests: quests.len() as u32,
        },
        quests,
    }
}
