use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{
    Achievement, Badge, BadgeId, Chapter, ChapterId, CourseId, ProgressRecord, QuizQuestion,
    StudentId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// What a durable progress write changed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    /// The record as stored after the merge.
    pub record: ProgressRecord,
    /// This write flipped the durable completion flag from false to true.
    pub completed_now: bool,
}

/// Progress Store contract, keyed by (student, chapter).
///
/// Writes merge instead of overwrite: the stored rate is the max of old and
/// new, completion is only ever set (never cleared), and a known course or
/// quiz result is never erased by a snapshot that lacks it.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the record for one pair.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn get_progress(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<Option<ProgressRecord>, StorageError>;

    /// Merge a snapshot into the store, creating the record if needed, and
    /// return the merged record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<UpsertOutcome, StorageError>;

    /// Set the completion flag if it is currently false.
    ///
    /// Returns true only for the caller whose write performed the transition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist, or other
    /// storage errors.
    async fn mark_completed(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Full progress history of one student.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn list_by_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;

    /// Progress of one student within one course, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn list_by_student_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Vec<ProgressRecord>, StorageError>;
}

/// Read access to chapters and their unlock thresholds.
#[async_trait]
pub trait ChapterRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_chapter(&self, chapter: &Chapter) -> Result<(), StorageError>;
}

/// Badge catalog plus the insert-only achievement ledger.
#[async_trait]
pub trait BadgeRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn list_badges(&self) -> Result<Vec<Badge>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_badge(&self, badge: &Badge) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn achievements_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Achievement>, StorageError>;

    /// Record an achievement unless one already exists for the pair.
    ///
    /// Returns false when the (student, badge) pair was already recorded.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn insert_achievement(&self, achievement: &Achievement) -> Result<bool, StorageError>;
}

/// Quiz bank lookup.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Questions of one chapter ordered by `sort_order`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the store cannot be reached.
    async fn questions_for_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<QuizQuestion>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn upsert_question(&self, question: &QuizQuestion) -> Result<(), StorageError>;
}

/// Merge an incoming snapshot over the stored record, leaving completion as
/// it was. Completion is applied separately through `mark_completed` so the
/// false → true flip has exactly one winner.
#[must_use]
pub fn merge_progress(existing: &ProgressRecord, incoming: &ProgressRecord) -> ProgressRecord {
    ProgressRecord::from_persisted(
        existing.student_id(),
        existing.chapter_id(),
        incoming.course_id().or(existing.course_id()),
        incoming.watch_time_seconds(),
        incoming.last_position_seconds(),
        existing.video_rate().max(incoming.video_rate()),
        incoming.last_update_time().or(existing.last_update_time()),
        incoming.quiz_score().or(existing.quiz_score()),
        incoming.quiz_submitted_at().or(existing.quiz_submitted_at()),
        existing.is_completed(),
        existing.completed_at(),
    )
}

/// When a snapshot claims completion, the time to stamp on the durable flip.
pub(crate) fn completion_time(record: &ProgressRecord) -> DateTime<Utc> {
    record
        .completed_at()
        .or(record.last_update_time())
        .unwrap_or_else(Utc::now)
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<(StudentId, ChapterId), ProgressRecord>>>,
    chapters: Arc<Mutex<HashMap<ChapterId, Chapter>>>,
    badges: Arc<Mutex<HashMap<BadgeId, Badge>>>,
    achievements: Arc<Mutex<HashMap<(StudentId, BadgeId), Achievement>>>,
    questions: Arc<Mutex<HashMap<ChapterId, Vec<QuizQuestion>>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(&(student_id, chapter_id)).cloned())
    }

    async fn upsert_progress(
        &self,
        record: &ProgressRecord,
    ) -> Result<UpsertOutcome, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let key = (record.student_id(), record.chapter_id());
        let base = ProgressRecord::new(record.student_id(), record.chapter_id());
        let mut merged = merge_progress(guard.get(&key).unwrap_or(&base), record);
        let completed_now = record.is_completed() && merged.mark_completed(completion_time(record));
        guard.insert(key, merged.clone());
        Ok(UpsertOutcome {
            record: merged,
            completed_now,
        })
    }

    async fn mark_completed(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        let record = guard
            .get_mut(&(student_id, chapter_id))
            .ok_or(StorageError::NotFound)?;
        Ok(record.mark_completed(at))
    }

    async fn list_by_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut out: Vec<ProgressRecord> = guard
            .values()
            .filter(|r| r.student_id() == student_id)
            .cloned()
            .collect();
        out.sort_by_key(ProgressRecord::chapter_id);
        Ok(out)
    }

    async fn list_by_student_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        let mut out: Vec<ProgressRecord> = guard
            .values()
            .filter(|r| r.student_id() == student_id && r.course_id() == Some(course_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.last_update_time().cmp(&a.last_update_time()));
        Ok(out)
    }
}

#[async_trait]
impl ChapterRepository for InMemoryRepository {
    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError> {
        let guard = self.chapters.lock().map_err(poisoned)?;
        Ok(guard.get(&id).cloned())
    }

    async fn upsert_chapter(&self, chapter: &Chapter) -> Result<(), StorageError> {
        let mut guard = self.chapters.lock().map_err(poisoned)?;
        guard.insert(chapter.id, chapter.clone());
        Ok(())
    }
}

#[async_trait]
impl BadgeRepository for InMemoryRepository {
    async fn list_badges(&self) -> Result<Vec<Badge>, StorageError> {
        let guard = self.badges.lock().map_err(poisoned)?;
        let mut out: Vec<Badge> = guard.values().cloned().collect();
        out.sort_by_key(|b| b.id);
        Ok(out)
    }

    async fn upsert_badge(&self, badge: &Badge) -> Result<(), StorageError> {
        let mut guard = self.badges.lock().map_err(poisoned)?;
        guard.insert(badge.id, badge.clone());
        Ok(())
    }

    async fn achievements_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Achievement>, StorageError> {
        let guard = self.achievements.lock().map_err(poisoned)?;
        let mut out: Vec<Achievement> = guard
            .values()
            .filter(|a| a.student_id == student_id)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.badge_id);
        Ok(out)
    }

    async fn insert_achievement(&self, achievement: &Achievement) -> Result<bool, StorageError> {
        let mut guard = self.achievements.lock().map_err(poisoned)?;
        let key = (achievement.student_id, achievement.badge_id);
        if guard.contains_key(&key) {
            return Ok(false);
        }
        guard.insert(key, achievement.clone());
        Ok(true)
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn questions_for_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<QuizQuestion>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        let mut out = guard.get(&chapter_id).cloned().unwrap_or_default();
        out.sort_by_key(|q| (q.sort_order, q.id));
        Ok(out)
    }

    async fn upsert_question(&self, question: &QuizQuestion) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        let bank = guard.entry(question.chapter_id).or_default();
        bank.retain(|q| q.id != question.id);
        bank.push(question.clone());
        Ok(())
    }
}

/// Aggregates repository trait objects for easy wiring/swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressRepository>,
    pub chapters: Arc<dyn ChapterRepository>,
    pub badges: Arc<dyn BadgeRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repo(InMemoryRepository::new())
    }

    /// Wire every repository role to one backing implementation.
    #[must_use]
    pub fn from_repo<R>(repo: R) -> Self
    where
        R: ProgressRepository
            + ChapterRepository
            + BadgeRepository
            + QuizRepository
            + Clone
            + 'static,
    {
        Self {
            progress: Arc::new(repo.clone()),
            chapters: Arc::new(repo.clone()),
            badges: Arc::new(repo.clone()),
            quizzes: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::model::BadgeCondition;
    use progress_core::time::fixed_now;

    fn record(rate: f64) -> ProgressRecord {
        let mut r = ProgressRecord::new(StudentId::new(1), ChapterId::new(1));
        r.set_course(Some(CourseId::new(9)));
        r.apply_position(120, fixed_now());
        r.raise_video_rate(rate);
        r
    }

    #[tokio::test]
    async fn upsert_keeps_highest_rate() {
        let repo = InMemoryRepository::new();
        repo.upsert_progress(&record(0.7)).await.unwrap();
        repo.upsert_progress(&record(0.3)).await.unwrap();

        let stored = repo
            .get_progress(StudentId::new(1), ChapterId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.video_rate(), 0.7);
    }

    #[tokio::test]
    async fn stale_snapshot_cannot_clear_completion_or_quiz() {
        let repo = InMemoryRepository::new();
        let mut done = record(0.95);
        done.record_quiz(80, fixed_now());
        done.mark_completed(fixed_now());
        let outcome = repo.upsert_progress(&done).await.unwrap();
        assert!(outcome.completed_now);

        let stale = record(0.5);
        let outcome = repo.upsert_progress(&stale).await.unwrap();
        assert!(!outcome.completed_now);
        assert!(outcome.record.is_completed());
        assert_eq!(outcome.record.quiz_score(), Some(80));
        assert_eq!(outcome.record.video_rate(), 0.95);

        let stored = repo
            .get_progress(StudentId::new(1), ChapterId::new(1))
            .await
            .unwrap()
            .unwrap();
        assert!(stored.is_completed());
        assert_eq!(stored.completed_at(), Some(fixed_now()));
        assert_eq!(stored.quiz_score(), Some(80));
    }

    #[tokio::test]
    async fn mark_completed_has_one_winner() {
        let repo = InMemoryRepository::new();
        repo.upsert_progress(&record(0.95)).await.unwrap();

        let first = repo
            .mark_completed(StudentId::new(1), ChapterId::new(1), fixed_now())
            .await
            .unwrap();
        let second = repo
            .mark_completed(
                StudentId::new(1),
                ChapterId::new(1),
                fixed_now() + Duration::seconds(1),
            )
            .await
            .unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn mark_completed_on_missing_record_is_not_found() {
        let repo = InMemoryRepository::new();
        let err = repo
            .mark_completed(StudentId::new(5), ChapterId::new(5), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn achievements_are_unique_per_student_and_badge() {
        let repo = InMemoryRepository::new();
        repo.upsert_badge(&Badge::new(
            BadgeId::new(1),
            "First chapter",
            BadgeCondition::ChapterCompletionCount,
            1,
        ))
        .await
        .unwrap();

        let achievement = Achievement {
            student_id: StudentId::new(1),
            badge_id: BadgeId::new(1),
            earned_at: fixed_now(),
        };
        assert!(repo.insert_achievement(&achievement).await.unwrap());
        assert!(!repo.insert_achievement(&achievement).await.unwrap());
        assert_eq!(
            repo.achievements_for_student(StudentId::new(1))
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn course_listing_is_most_recent_first() {
        let repo = InMemoryRepository::new();
        for (chapter, offset) in [(1_u64, 0_i64), (2, 60), (3, 30)] {
            let mut r = ProgressRecord::new(StudentId::new(1), ChapterId::new(chapter));
            r.set_course(Some(CourseId::new(9)));
            r.apply_position(10, fixed_now() + Duration::seconds(offset));
            repo.upsert_progress(&r).await.unwrap();
        }

        let listed = repo
            .list_by_student_course(StudentId::new(1), CourseId::new(9))
            .await
            .unwrap();
        let order: Vec<u64> = listed.iter().map(|r| r.chapter_id().value()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }
}
