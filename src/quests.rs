//! Quest catalog and evaluation
//!
//! Quests are threshold goals over a handful of journal metrics. The catalog
//! is fixed: seven groups, each a list of ascending targets with a reward
//! that grows by a fixed step per target.

use crate::analytics::round_to;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Metric a quest is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QuestMetric {
    CurrentStreak,
    TotalEntries,
    ReflectionAvgWords,
    ConsistencyRatePct,
    ThemesCovered,
    Cooperation,
    ActiveDays,
}

/// One catalog quest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestDefinition {
    pub id: String,
    pub metric: QuestMetric,
    pub category: String,
    pub title: String,
    pub target: u32,
    pub reward_xp: u32,
}

struct QuestGroup {
    prefix: &'static str,
    metric: QuestMetric,
    category: &'static str,
    thresholds: &'static [u32],
    reward_base: u32,
    reward_step: u32,
    /// `{}` is replaced by the target
    title: &'static str,
}

const QUEST_GROUPS: &[QuestGroup] = &[
    QuestGroup {
        prefix: "streak",
        metric: QuestMetric::CurrentStreak,
        category: "Consistency",
        thresholds: &[1, 2, 3, 4, 5, 7, 10, 14, 21, 30, 45, 60],
        reward_base: 25,
        reward_step: 6,
        title: "Hold a {}-day streak",
    },
    QuestGroup {
        prefix: "volume",
        metric: QuestMetric::TotalEntries,
        category: "Volume",
        thresholds: &[1, 2, 3, 5, 7, 10, 14, 21, 30, 45, 60, 90],
        reward_base: 20,
        reward_step: 5,
        title: "Log {} total entries",
    },
    QuestGroup {
        prefix: "reflection",
        metric: QuestMetric::ReflectionAvgWords,
        category: "Depth",
        thresholds: &[5, 8, 10, 12, 15, 18, 22, 26, 30, 40],
        reward_base: 22,
        reward_step: 6,
        title: "Reach {}+ avg reflection words",
    },
    QuestGroup {
        prefix: "consistency-rate",
        metric: QuestMetric::ConsistencyRatePct,
        category: "Stability",
        thresholds: &[30, 40, 50, 60, 70, 80, 90, 100],
        reward_base: 24,
        reward_step: 7,
        title: "Maintain {}% consistency rate",
    },
    QuestGroup {
        prefix: "theme",
        metric: QuestMetric::ThemesCovered,
        category: "Exploration",
        thresholds: &[1, 2, 3, 4, 5, 6, 7],
        reward_base: 18,
        reward_step: 6,
        title: "Cover {} unique life themes",
    },
    QuestGroup {
        prefix: "cooperation",
        metric: QuestMetric::Cooperation,
        category: "Strategy",
        thresholds: &[20, 30, 40, 50, 60, 70, 80, 90, 95],
        reward_base: 20,
        reward_step: 8,
        title: "Push cooperation score to {}",
    },
    QuestGroup {
        prefix: "active-days",
        metric: QuestMetric::ActiveDays,
        category: "Commitment",
        thresholds: &[2, 4, 6, 8, 10, 14, 20, 30],
        reward_base: 16,
        reward_step: 5,
        title: "Be active on {} unique days",
    },
];

static CATALOG: Lazy<Vec<QuestDefinition>> = Lazy::new(|| {
    QUEST_GROUPS
        .iter()
        .flat_map(|group| {
            group
                .thresholds
                .iter()
                .enumerate()
                .map(move |(index, &target)| QuestDefinition {
                    id: format!("{}-{}", group.prefix, target),
                    metric: group.metric,
                    category: group.category.to_string(),
                    title: group.title.replace("{}", &target.to_string()),
                    target,
                    reward_xp: group.reward_base + index as u32 * group.reward_step,
                })
        })
        .collect()
});

/// The full quest catalog, in group order
pub fn quest_catalog() -> &'static [QuestDefinition] {
    &CATALOG
}

/// Metric values quests are evaluated against
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub current_streak: u32,
    pub total_entries: u32,
    pub reflection_avg_words: f64,
    pub consistency_rate_pct: f64,
    pub themes_covered: u32,
    pub cooperation: u32,
    pub active_days: u32,
}

impl MetricSnapshot {
    pub fn value(&self, metric: QuestMetric) -> f64 {
        match metric {
            QuestMetric::CurrentStreak => self.current_streak as f64,
            QuestMetric::TotalEntries => self.total_entries as f64,
            QuestMetric::ReflectionAvgWords => self.reflection_avg_words,
            QuestMetric::ConsistencyRatePct => self.consistency_rate_pct,
            QuestMetric::ThemesCovered => self.themes_covered as f64,
            QuestMetric::Cooperation => self.cooperation as f64,
            QuestMetric::ActiveDays => self.active_days as f64,
        }
    }
}

/// A quest with progress against a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub category: String,
    pub reward_xp: u32,
    pub target: u32,
    /// Metric value, rounded to 0.1
    pub progress: f64,
    /// Judged on the unrounded value
    pub done: bool,
}

/// Evaluate every catalog quest against `metrics`
pub fn evaluate_quests(metrics: &MetricSnapshot) -> Vec<Quest> {
    quest_catalog()
        .iter()
        .map(|quest| {
            let value = metrics.value(quest.metric);
            Quest {
                id: quest.id.clone(),
                title: quest.title.clone(),
                category: quest.category.clone(),
                reward_xp: quest.reward_xp,
                target: quest.target,
                progress: round_to(value, 1),
                done: value >= quest.target as f64,
            }
        })
        .collect()
}
