//! One-shot InProgress → Completed transition per (student, chapter).
//!
//! The guard runs after every durable flush. Whoever flips the durable flag
//! (a conditional write) owns the downstream effects; a loser of that race
//! only adopts the durable completion time. Each effect is attempted on its
//! own and failures are logged, never propagated.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use progress_core::model::{Badge, Chapter, ChapterId, ProgressRecord, UnlockPolicy};
use serde::{Deserialize, Serialize};
use storage::repository::{ChapterRepository, ProgressRepository};
use tracing::{debug, error, info, warn};

use crate::badge_service::BadgeService;
use crate::collaborators::{
    AssignmentUnlocker, CHAPTER_COMPLETED_TOPIC, ChapterCompleted, EventEnvelope, EventPublisher,
};
use crate::error::UnlockError;

/// What the state machine did after one flush.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockOutcome {
    /// This flush performed the completion transition.
    pub transitioned: bool,
    /// Badges awarded as a side effect of the transition.
    pub awarded: Vec<Badge>,
}

/// Diagnostic view of the unlock guard for one (student, chapter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockStatus {
    pub can_unlock: bool,
    pub video_rate: f64,
    pub required_video_rate: Option<f64>,
    pub video_met: bool,
    pub quiz_score: u32,
    pub required_quiz_score: Option<u32>,
    pub quiz_met: bool,
    pub is_completed: bool,
    pub policy_found: bool,
}

impl UnlockStatus {
    /// Evaluate the guard. Without a chapter there is no policy and the guard
    /// can never pass.
    #[must_use]
    pub fn evaluate(chapter: Option<&Chapter>, record: Option<&ProgressRecord>) -> Self {
        let video_rate = record.map_or(0.0, ProgressRecord::video_rate);
        let quiz_score = record.and_then(ProgressRecord::quiz_score).unwrap_or(0);
        let is_completed = record.is_some_and(ProgressRecord::is_completed);

        let Some(policy) = chapter.map(Chapter::policy) else {
            return Self {
                can_unlock: false,
                video_rate,
                required_video_rate: None,
                video_met: false,
                quiz_score,
                required_quiz_score: None,
                quiz_met: false,
                is_completed,
                policy_found: false,
            };
        };

        let check = policy.check_scores(video_rate, quiz_score);
        Self {
            can_unlock: check.satisfied(),
            video_rate,
            required_video_rate: Some(policy.required_video_rate()),
            video_met: check.video_met,
            quiz_score,
            required_quiz_score: Some(policy.required_quiz_score()),
            quiz_met: check.quiz_met,
            is_completed,
            policy_found: true,
        }
    }
}

pub struct UnlockStateMachine {
    progress: Arc<dyn ProgressRepository>,
    chapters: Arc<dyn ChapterRepository>,
    events: Arc<dyn EventPublisher>,
    assignments: Arc<dyn AssignmentUnlocker>,
    badges: Arc<BadgeService>,
}

impl UnlockStateMachine {
    #[must_use]
    pub fn new(
        progress: Arc<dyn ProgressRepository>,
        chapters: Arc<dyn ChapterRepository>,
        events: Arc<dyn EventPublisher>,
        assignments: Arc<dyn AssignmentUnlocker>,
        badges: Arc<BadgeService>,
    ) -> Self {
        Self {
            progress,
            chapters,
            events,
            assignments,
            badges,
        }
    }

    /// Re-judge a record as the durable store holds it after a write.
    ///
    /// `completed_now` is true when that write itself flipped the completion
    /// flag (client-declared completion); the effects then run without
    /// re-judging thresholds. On return `record` reflects the durable
    /// completion state.
    pub async fn on_flush(
        &self,
        record: &mut ProgressRecord,
        completed_now: bool,
        now: DateTime<Utc>,
    ) -> UnlockOutcome {
        if completed_now {
            let chapter = self.lookup_chapter(record.chapter_id()).await;
            return self.complete(record, chapter.as_ref(), now).await;
        }

        if record.is_completed() {
            return UnlockOutcome::default();
        }

        let Some(chapter) = self.lookup_chapter(record.chapter_id()).await else {
            debug!(
                student_id = %record.student_id(),
                chapter_id = %record.chapter_id(),
                "no unlock policy for chapter; guard unsatisfiable"
            );
            return UnlockOutcome::default();
        };

        let policy: UnlockPolicy = chapter.policy();
        if !policy.is_satisfied_by(record) {
            return UnlockOutcome::default();
        }

        match self
            .progress
            .mark_completed(record.student_id(), record.chapter_id(), now)
            .await
        {
            Ok(true) => {
                record.mark_completed(now);
                self.complete(record, Some(&chapter), now).await
            }
            Ok(false) => {
                debug!(
                    student_id = %record.student_id(),
                    chapter_id = %record.chapter_id(),
                    "completion already recorded by a concurrent writer"
                );
                self.adopt_durable(record).await;
                UnlockOutcome::default()
            }
            Err(e) => {
                error!(
                    error = %e,
                    student_id = %record.student_id(),
                    chapter_id = %record.chapter_id(),
                    "completion write failed; will re-evaluate on next flush"
                );
                UnlockOutcome::default()
            }
        }
    }

    /// Report the guard for `record` against the chapter's current policy.
    ///
    /// # Errors
    ///
    /// Returns `UnlockError::Storage` if the chapter cannot be read.
    pub async fn check_unlock_condition(
        &self,
        chapter_id: ChapterId,
        record: Option<&ProgressRecord>,
    ) -> Result<UnlockStatus, UnlockError> {
        let chapter = self.chapters.get_chapter(chapter_id).await?;
        Ok(UnlockStatus::evaluate(chapter.as_ref(), record))
    }

    async fn lookup_chapter(&self, chapter_id: ChapterId) -> Option<Chapter> {
        match self.chapters.get_chapter(chapter_id).await {
            Ok(chapter) => chapter,
            Err(e) => {
                error!(error = %e, %chapter_id, "chapter lookup failed");
                None
            }
        }
    }

    /// Replace the in-flight copy with the durable record so the cache never
    /// carries a completion time the store does not have.
    async fn adopt_durable(&self, record: &mut ProgressRecord) {
        match self
            .progress
            .get_progress(record.student_id(), record.chapter_id())
            .await
        {
            Ok(Some(durable)) if durable.is_completed() => *record = durable,
            Ok(_) => {}
            Err(e) => warn!(
                error = %e,
                student_id = %record.student_id(),
                chapter_id = %record.chapter_id(),
                "could not re-read completed record"
            ),
        }
    }

    async fn complete(
        &self,
        record: &ProgressRecord,
        chapter: Option<&Chapter>,
        now: DateTime<Utc>,
    ) -> UnlockOutcome {
        let student_id = record.student_id();
        let chapter_id = record.chapter_id();
        info!(%student_id, %chapter_id, "chapter completed");

        let event = ChapterCompleted {
            student_id,
            chapter_id,
            course_id: record.course_id().or(chapter.and_then(|c| c.course_id)),
            chapter_title: chapter.map(|c| c.title.clone()),
        };
        let published = match EventEnvelope::chapter_completed(&event, now) {
            Ok(envelope) => self.events.publish(CHAPTER_COMPLETED_TOPIC, &envelope).await,
            Err(e) => Err(e),
        };
        if let Err(e) = published {
            error!(error = %e, %student_id, %chapter_id, "chapter-completed event not published");
        }

        if let Err(e) = self.assignments.ensure_unlocked(student_id, chapter_id).await {
            error!(error = %e, %student_id, %chapter_id, "assignment unlock failed");
        }

        let awarded = match self.badges.check_and_award(student_id).await {
            Ok(awarded) => awarded,
            Err(e) => {
                error!(error = %e, %student_id, %chapter_id, "badge evaluation failed");
                Vec::new()
            }
        };

        UnlockOutcome {
            transitioned: true,
            awarded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::{CourseId, StudentId};

    fn record(rate: f64, quiz: Option<u32>) -> ProgressRecord {
        let mut r = ProgressRecord::new(StudentId::new(1), ChapterId::new(1));
        r.set_course(Some(CourseId::new(2)));
        r.raise_video_rate(rate);
        if let Some(score) = quiz {
            r.record_quiz(score, progress_core::time::fixed_now());
        }
        r
    }

    #[test]
    fn status_without_chapter_is_unsatisfiable() {
        let status = UnlockStatus::evaluate(None, Some(&record(1.0, Some(100))));
        assert!(!status.can_unlock);
        assert!(!status.policy_found);
        assert_eq!(status.required_video_rate, None);
        assert_eq!(status.video_rate, 1.0);
    }

    #[test]
    fn status_reports_each_half_of_the_guard() {
        let chapter = Chapter::new(ChapterId::new(1), "Traits");
        let status = UnlockStatus::evaluate(Some(&chapter), Some(&record(0.95, Some(40))));
        assert!(status.video_met);
        assert!(!status.quiz_met);
        assert!(!status.can_unlock);
        assert_eq!(status.required_quiz_score, Some(60));
        assert!(status.policy_found);
    }

    #[test]
    fn status_without_record_uses_zeroes() {
        let chapter = Chapter::new(ChapterId::new(1), "Traits");
        let status = UnlockStatus::evaluate(Some(&chapter), None);
        assert_eq!(status.video_rate, 0.0);
        assert_eq!(status.quiz_score, 0);
        assert!(!status.is_completed);
    }
}
