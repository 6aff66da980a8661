use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{BadgeId, StudentId};
use crate::model::progress::ProgressRecord;

/// Quiz score that counts as perfect.
pub const PERFECT_QUIZ_SCORE: u32 = 100;

/// Progress at or above this percentage (and below 100) marks a badge as
/// close to unlocking.
pub const DEFAULT_NEAR_UNLOCK_PERCENT: u8 = 80;

//
// ─── CONDITIONS ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown badge condition type: {0}")]
pub struct BadgeConditionError(pub String);

/// What a badge measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCondition {
    /// Number of chapters completed.
    ChapterCompletionCount,
    /// Number of distinct calendar days with recorded activity.
    StudyDays,
    /// 1 once any quiz reached a perfect score, else 0.
    PerfectQuizScore,
}

impl BadgeCondition {
    /// Stable storage name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeCondition::ChapterCompletionCount => "chapter_complete",
            BadgeCondition::StudyDays => "study_days",
            BadgeCondition::PerfectQuizScore => "perfect_score",
        }
    }
}

impl fmt::Display for BadgeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BadgeCondition {
    type Err = BadgeConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chapter_complete" => Ok(Self::ChapterCompletionCount),
            "study_days" => Ok(Self::StudyDays),
            "perfect_score" => Ok(Self::PerfectQuizScore),
            other => Err(BadgeConditionError(other.to_owned())),
        }
    }
}

//
// ─── CATALOG & ACHIEVEMENTS ────────────────────────────────────────────────────
//

/// Static catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    pub id: BadgeId,
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub condition: BadgeCondition,
    pub condition_value: u32,
}

impl Badge {
    #[must_use]
    pub fn new(
        id: BadgeId,
        name: impl Into<String>,
        condition: BadgeCondition,
        condition_value: u32,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            icon: None,
            condition,
            condition_value,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    #[must_use]
    pub fn is_met_by(&self, stats: &ProgressStats) -> bool {
        stats.current_value(self.condition) >= self.condition_value
    }
}

/// Permanent proof that a student qualified for a badge. Insert-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Achievement {
    pub student_id: StudentId,
    pub badge_id: BadgeId,
    pub earned_at: DateTime<Utc>,
}

//
// ─── STATS ─────────────────────────────────────────────────────────────────────
//

/// Every condition's current value, computed in one pass over a student's
/// progress history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressStats {
    pub completed_chapters: u32,
    pub study_days: u32,
    pub has_perfect_score: bool,
}

impl ProgressStats {
    #[must_use]
    pub fn from_records(records: &[ProgressRecord]) -> Self {
        let mut completed = 0_u32;
        let mut days: BTreeSet<NaiveDate> = BTreeSet::new();
        let mut perfect = false;

        for record in records {
            if record.is_completed() {
                completed = completed.saturating_add(1);
            }
            if let Some(at) = record.last_update_time() {
                days.insert(at.date_naive());
            }
            if record.quiz_score().is_some_and(|s| s >= PERFECT_QUIZ_SCORE) {
                perfect = true;
            }
        }

        Self {
            completed_chapters: completed,
            study_days: u32::try_from(days.len()).unwrap_or(u32::MAX),
            has_perfect_score: perfect,
        }
    }

    #[must_use]
    pub fn current_value(&self, condition: BadgeCondition) -> u32 {
        match condition {
            BadgeCondition::ChapterCompletionCount => self.completed_chapters,
            BadgeCondition::StudyDays => self.study_days,
            BadgeCondition::PerfectQuizScore => u32::from(self.has_perfect_score),
        }
    }
}

//
// ─── PROJECTION ────────────────────────────────────────────────────────────────
//

/// A badge as seen from one student's badge wall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeProgress {
    pub badge: Badge,
    pub earned: bool,
    pub earned_at: Option<DateTime<Utc>>,
    pub progress_percent: u8,
    pub current_value: u32,
    pub target_value: u32,
    pub near_unlock: bool,
}

impl BadgeProgress {
    /// Project one badge against a student's stats.
    ///
    /// A recorded achievement, or a current value already at the threshold,
    /// reports as earned at 100%. Otherwise the percentage is
    /// `min(100, current * 100 / target)` and near-unlock means
    /// `near_unlock_percent <= percent < 100`.
    #[must_use]
    pub fn project(
        badge: Badge,
        achievement: Option<&Achievement>,
        stats: &ProgressStats,
        near_unlock_percent: u8,
    ) -> Self {
        let current_value = stats.current_value(badge.condition);
        let target_value = badge.condition_value;

        if achievement.is_some() || current_value >= target_value {
            return Self {
                earned_at: achievement.map(|a| a.earned_at),
                badge,
                earned: true,
                progress_percent: 100,
                current_value,
                target_value,
                near_unlock: false,
            };
        }

        let percent = (u64::from(current_value) * 100 / u64::from(target_value)).min(100);
        let progress_percent = u8::try_from(percent).unwrap_or(100);

        Self {
            badge,
            earned: false,
            earned_at: None,
            progress_percent,
            current_value,
            target_value,
            near_unlock: progress_percent >= near_unlock_percent && progress_percent < 100,
        }
    }
}
