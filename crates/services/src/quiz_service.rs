use std::collections::BTreeMap;
use std::sync::Arc;

use progress_core::model::{
    ChapterId, CourseId, QuestionId, QuizAnswer, StudentId, grade_quiz,
};
use progress_core::time::Clock;
use serde::{Deserialize, Serialize};
use storage::repository::QuizRepository;
use tracing::{debug, info};

use crate::error::QuizServiceError;
use crate::progress::ProgressSyncService;
use crate::unlock::UnlockStateMachine;

/// Score reported for a chapter that has no quiz.
const NO_QUIZ_SCORE: u32 = 100;

/// Result of grading one quiz submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSubmission {
    pub score: u32,
    pub total_score: u32,
    pub percentage: u32,
    pub question_results: BTreeMap<QuestionId, bool>,
    /// False when the chapter has no questions and nothing was recorded.
    pub graded: bool,
    pub unlock_triggered: bool,
}

pub struct QuizService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    sync: Arc<ProgressSyncService>,
    unlock: Arc<UnlockStateMachine>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        sync: Arc<ProgressSyncService>,
        unlock: Arc<UnlockStateMachine>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            sync,
            unlock,
        }
    }

    /// Grade answers, record the earned points on the student's progress and
    /// re-judge the chapter's unlock guard.
    ///
    /// The quiz write is always durable; it never waits for the write-behind
    /// interval.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` if the quiz bank cannot be read and
    /// `QuizServiceError::Progress` if the progress write fails.
    pub async fn submit_quiz(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
        course_id: Option<CourseId>,
        answers: &[QuizAnswer],
    ) -> Result<QuizSubmission, QuizServiceError> {
        let questions = self.quizzes.questions_for_chapter(chapter_id).await?;
        if questions.is_empty() {
            debug!(%student_id, %chapter_id, "chapter has no quiz; nothing recorded");
            return Ok(QuizSubmission {
                score: NO_QUIZ_SCORE,
                total_score: NO_QUIZ_SCORE,
                percentage: 100,
                question_results: BTreeMap::new(),
                graded: false,
                unlock_triggered: false,
            });
        }

        let grade = grade_quiz(&questions, answers);
        let now = self.clock.now();

        let mut record = self
            .sync
            .load_snapshot(student_id, chapter_id)
            .await?;
        record.set_course(course_id);
        record.record_quiz(grade.score, now);

        let outcome = self.sync.flush(&record, now).await?;
        let mut stored = outcome.record;
        let unlock = self
            .unlock
            .on_flush(&mut stored, outcome.completed_now, now)
            .await;
        self.sync.snapshots().store(&stored).await;

        info!(
            %student_id,
            %chapter_id,
            score = grade.score,
            total = grade.total,
            unlock_triggered = unlock.transitioned,
            "quiz graded"
        );

        Ok(QuizSubmission {
            score: grade.score,
            total_score: grade.total,
            percentage: grade.percentage(),
            question_results: grade.results,
            graded: true,
            unlock_triggered: unlock.transitioned,
        })
    }
}
