use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{ChapterId, CourseId, StudentId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Reasons a progress report is refused before any state is read.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("total duration must be positive")]
    ZeroDuration,
    #[error("video rate must be within [0, 1], got {0}")]
    RateOutOfRange(f64),
}

//
// ─── PROGRESS RECORD ───────────────────────────────────────────────────────────
//

/// Learning progress of one student in one chapter.
///
/// `video_rate` only ever grows and `is_completed` flips from false to true at
/// most once; every mutator on this type preserves both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    student_id: StudentId,
    chapter_id: ChapterId,
    course_id: Option<CourseId>,
    watch_time_seconds: u32,
    last_position_seconds: u32,
    video_rate: f64,
    last_update_time: Option<DateTime<Utc>>,
    quiz_score: Option<u32>,
    quiz_submitted_at: Option<DateTime<Utc>>,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// Zero-valued record for a pair that has never reported anything.
    #[must_use]
    pub fn new(student_id: StudentId, chapter_id: ChapterId) -> Self {
        Self {
            student_id,
            chapter_id,
            course_id: None,
            watch_time_seconds: 0,
            last_position_seconds: 0,
            video_rate: 0.0,
            last_update_time: None,
            quiz_score: None,
            quiz_submitted_at: None,
            is_completed: false,
            completed_at: None,
        }
    }

    /// Rebuild a record from persisted columns.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        student_id: StudentId,
        chapter_id: ChapterId,
        course_id: Option<CourseId>,
        watch_time_seconds: u32,
        last_position_seconds: u32,
        video_rate: f64,
        last_update_time: Option<DateTime<Utc>>,
        quiz_score: Option<u32>,
        quiz_submitted_at: Option<DateTime<Utc>>,
        is_completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            student_id,
            chapter_id,
            course_id,
            watch_time_seconds,
            last_position_seconds,
            video_rate: video_rate.clamp(0.0, 1.0),
            last_update_time,
            quiz_score,
            quiz_submitted_at,
            is_completed,
            completed_at: if is_completed { completed_at } else { None },
        }
    }

    #[must_use]
    pub fn student_id(&self) -> StudentId {
        self.student_id
    }

    #[must_use]
    pub fn chapter_id(&self) -> ChapterId {
        self.chapter_id
    }

    #[must_use]
    pub fn course_id(&self) -> Option<CourseId> {
        self.course_id
    }

    #[must_use]
    pub fn watch_time_seconds(&self) -> u32 {
        self.watch_time_seconds
    }

    #[must_use]
    pub fn last_position_seconds(&self) -> u32 {
        self.last_position_seconds
    }

    #[must_use]
    pub fn video_rate(&self) -> f64 {
        self.video_rate
    }

    /// Server time of the last accepted mutation; `None` until the first one.
    #[must_use]
    pub fn last_update_time(&self) -> Option<DateTime<Utc>> {
        self.last_update_time
    }

    #[must_use]
    pub fn quiz_score(&self) -> Option<u32> {
        self.quiz_score
    }

    #[must_use]
    pub fn quiz_submitted_at(&self) -> Option<DateTime<Utc>> {
        self.quiz_submitted_at
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.is_completed
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Attach the course when the caller knows it; an unknown course never
    /// erases a known one.
    pub fn set_course(&mut self, course_id: Option<CourseId>) {
        if course_id.is_some() {
            self.course_id = course_id;
        }
    }

    /// Record the latest playback position reported by the player.
    ///
    /// Position moves freely (seeking backwards is legal); only the rate is
    /// monotonic.
    pub fn apply_position(&mut self, position_seconds: u32, at: DateTime<Utc>) {
        self.watch_time_seconds = position_seconds;
        self.last_position_seconds = position_seconds;
        self.last_update_time = Some(at);
    }

    /// Keep the highest completion ratio seen so far. Returns true if it grew.
    pub fn raise_video_rate(&mut self, candidate: f64) -> bool {
        let candidate = candidate.clamp(0.0, 1.0);
        if candidate > self.video_rate {
            self.video_rate = candidate;
            true
        } else {
            false
        }
    }

    pub fn record_quiz(&mut self, score: u32, at: DateTime<Utc>) {
        self.quiz_score = Some(score);
        self.quiz_submitted_at = Some(at);
    }

    /// One-shot completion. Returns true only for the false → true transition.
    pub fn mark_completed(&mut self, at: DateTime<Utc>) -> bool {
        if self.is_completed {
            return false;
        }
        self.is_completed = true;
        self.completed_at = Some(at);
        true
    }
}

//
// ─── PROGRESS REPORT ───────────────────────────────────────────────────────────
//

/// A heartbeat from the video player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
    pub student_id: StudentId,
    pub chapter_id: ChapterId,
    #[serde(default)]
    pub course_id: Option<CourseId>,
    pub current_position: u32,
    #[serde(default)]
    pub total_duration: Option<u32>,
    #[serde(default)]
    pub explicit_rate: Option<f64>,
    #[serde(default)]
    pub completed: bool,
}

impl ProgressReport {
    #[must_use]
    pub fn new(student_id: StudentId, chapter_id: ChapterId, current_position: u32) -> Self {
        Self {
            student_id,
            chapter_id,
            course_id: None,
            current_position,
            total_duration: None,
            explicit_rate: None,
            completed: false,
        }
    }

    #[must_use]
    pub fn with_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    #[must_use]
    pub fn with_duration(mut self, total_duration: u32) -> Self {
        self.total_duration = Some(total_duration);
        self
    }

    #[must_use]
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.explicit_rate = Some(rate);
        self
    }

    #[must_use]
    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Reject reports that no real player could send.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` for a zero duration or a rate outside [0, 1].
    pub fn validate(&self) -> Result<(), ProgressError> {
        if self.total_duration == Some(0) {
            return Err(ProgressError::ZeroDuration);
        }
        if let Some(rate) = self.explicit_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ProgressError::RateOutOfRange(rate));
            }
        }
        Ok(())
    }

    /// Completion ratio carried by this report, if any.
    ///
    /// An explicit rate wins; otherwise `position / duration` rounded half-up
    /// to two decimals and capped at 1.
    #[must_use]
    pub fn candidate_rate(&self) -> Option<f64> {
        if let Some(rate) = self.explicit_rate {
            return Some(rate.clamp(0.0, 1.0));
        }
        let duration = u64::from(self.total_duration.filter(|d| *d > 0)?);
        let position = u64::from(self.current_position);
        let hundredths = (200 * position + duration) / (2 * duration);
        #[allow(clippy::cast_precision_loss)]
        let rate = hundredths.min(100) as f64 / 100.0;
        Some(rate)
    }
}
