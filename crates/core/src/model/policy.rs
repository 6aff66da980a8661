use serde::{Deserialize, Serialize};

use crate::model::ids::{ChapterId, CourseId};
use crate::model::progress::ProgressRecord;

pub const DEFAULT_REQUIRED_VIDEO_RATE: f64 = 0.90;
pub const DEFAULT_REQUIRED_QUIZ_SCORE: u32 = 60;

/// Thresholds gating the one-shot InProgress → Completed transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockPolicy {
    required_video_rate: f64,
    required_quiz_score: u32,
}

impl Default for UnlockPolicy {
    fn default() -> Self {
        Self {
            required_video_rate: DEFAULT_REQUIRED_VIDEO_RATE,
            required_quiz_score: DEFAULT_REQUIRED_QUIZ_SCORE,
        }
    }
}

/// Which halves of the guard a record currently meets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardCheck {
    pub video_met: bool,
    pub quiz_met: bool,
}

impl GuardCheck {
    #[must_use]
    pub fn satisfied(&self) -> bool {
        self.video_met && self.quiz_met
    }
}

impl UnlockPolicy {
    #[must_use]
    pub fn new(required_video_rate: f64, required_quiz_score: u32) -> Self {
        Self {
            required_video_rate,
            required_quiz_score,
        }
    }

    /// Defaults filled in wherever the chapter leaves a threshold unset.
    #[must_use]
    pub fn with_overrides(video_rate: Option<f64>, quiz_score: Option<u32>) -> Self {
        Self {
            required_video_rate: video_rate.unwrap_or(DEFAULT_REQUIRED_VIDEO_RATE),
            required_quiz_score: quiz_score.unwrap_or(DEFAULT_REQUIRED_QUIZ_SCORE),
        }
    }

    #[must_use]
    pub fn required_video_rate(&self) -> f64 {
        self.required_video_rate
    }

    #[must_use]
    pub fn required_quiz_score(&self) -> u32 {
        self.required_quiz_score
    }

    /// `videoRate ≥ required AND (quizScore ?? 0) ≥ required`.
    #[must_use]
    pub fn check(&self, record: &ProgressRecord) -> GuardCheck {
        self.check_scores(record.video_rate(), record.quiz_score().unwrap_or(0))
    }

    /// The guard over raw values, for callers that may have no record yet.
    #[must_use]
    pub fn check_scores(&self, video_rate: f64, quiz_score: u32) -> GuardCheck {
        GuardCheck {
            video_met: video_rate >= self.required_video_rate,
            quiz_met: quiz_score >= self.required_quiz_score,
        }
    }

    #[must_use]
    pub fn is_satisfied_by(&self, record: &ProgressRecord) -> bool {
        self.check(record).satisfied()
    }
}

/// The slice of a chapter this engine reads: identity plus unlock thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    pub course_id: Option<CourseId>,
    pub title: String,
    pub unlock_video_rate: Option<f64>,
    pub unlock_quiz_score: Option<u32>,
}

impl Chapter {
    #[must_use]
    pub fn new(id: ChapterId, title: impl Into<String>) -> Self {
        Self {
            id,
            course_id: None,
            title: title.into(),
            unlock_video_rate: None,
            unlock_quiz_score: None,
        }
    }

    #[must_use]
    pub fn policy(&self) -> UnlockPolicy {
        UnlockPolicy::with_overrides(self.unlock_video_rate, self.unlock_quiz_score)
    }
}
