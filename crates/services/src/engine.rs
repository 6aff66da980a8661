use std::sync::Arc;

use progress_core::model::{
    Badge, BadgeProgress, ChapterId, CourseId, ProgressRecord, ProgressReport, QuizAnswer,
    StudentId,
};
use progress_core::time::Clock;
use storage::cache::{FastCache, InMemoryCache, RedisCache};
use storage::repository::Storage;
use tracing::info;

use crate::badge_service::BadgeService;
use crate::collaborators::{
    AssignmentUnlocker, EventPublisher, LogAssignmentUnlocker, LogEventPublisher,
};
use crate::error::{
    BadgeServiceError, EngineError, ProgressServiceError, QuizServiceError, UnlockError,
};
use crate::progress::{ProgressSyncService, ReportOutcome, SnapshotCache};
use crate::quiz_service::{QuizService, QuizSubmission};
use crate::settings::EngineSettings;
use crate::unlock::{UnlockStateMachine, UnlockStatus};
use crate::view_cache::{InMemoryViewCache, ViewCache};

/// Downstream collaborators the engine calls on completion.
#[derive(Clone)]
pub struct Collaborators {
    pub events: Arc<dyn EventPublisher>,
    pub assignments: Arc<dyn AssignmentUnlocker>,
    pub views: Arc<dyn ViewCache>,
}

impl Collaborators {
    /// Log-only collaborators with a process-local view cache.
    #[must_use]
    pub fn logging() -> Self {
        Self {
            events: Arc::new(LogEventPublisher),
            assignments: Arc::new(LogAssignmentUnlocker),
            views: Arc::new(InMemoryViewCache::new()),
        }
    }
}

impl Default for Collaborators {
    fn default() -> Self {
        Self::logging()
    }
}

/// Assembles the progress engine and exposes its operations.
#[derive(Clone)]
pub struct ProgressEngine {
    clock: Clock,
    storage: Storage,
    sync: Arc<ProgressSyncService>,
    unlock: Arc<UnlockStateMachine>,
    badges: Arc<BadgeService>,
    quizzes: Arc<QuizService>,
}

impl ProgressEngine {
    #[must_use]
    pub fn new(
        clock: Clock,
        storage: Storage,
        cache: Arc<dyn FastCache>,
        collaborators: Collaborators,
        settings: &EngineSettings,
    ) -> Self {
        let badges = Arc::new(BadgeService::new(
            clock,
            Arc::clone(&storage.progress),
            Arc::clone(&storage.badges),
            settings.near_unlock_percent,
        ));
        let unlock = Arc::new(UnlockStateMachine::new(
            Arc::clone(&storage.progress),
            Arc::clone(&storage.chapters),
            collaborators.events,
            collaborators.assignments,
            Arc::clone(&badges),
        ));
        let snapshots = SnapshotCache::new(
            cache,
            settings.cache_key_prefix.clone(),
            settings.cache_ttl(),
        );
        let sync = Arc::new(ProgressSyncService::new(
            clock,
            Arc::clone(&storage.progress),
            snapshots,
            Arc::clone(&unlock),
            collaborators.views,
            settings.cheat_policy(),
            settings.sync_interval_millis(),
        ));
        let quizzes = Arc::new(QuizService::new(
            clock,
            Arc::clone(&storage.quizzes),
            Arc::clone(&sync),
            Arc::clone(&unlock),
        ));

        Self {
            clock,
            storage,
            sync,
            unlock,
            badges,
            quizzes,
        }
    }

    /// In-memory store and cache, e.g. for tests and dry runs.
    #[must_use]
    pub fn in_memory(clock: Clock, collaborators: Collaborators, settings: &EngineSettings) -> Self {
        Self::new(
            clock,
            Storage::in_memory(),
            Arc::new(InMemoryCache::with_clock(clock)),
            collaborators,
            settings,
        )
    }

    /// Engine backed by `SQLite`, with Redis as the fast cache when a URL is
    /// given and an in-process cache otherwise.
    ///
    /// # Errors
    ///
    /// Returns `EngineError` if the settings are invalid or the database or
    /// Redis cannot be reached.
    pub async fn new_sqlite(
        db_url: &str,
        redis_url: Option<&str>,
        clock: Clock,
        collaborators: Collaborators,
        settings: &EngineSettings,
    ) -> Result<Self, EngineError> {
        settings.validate()?;
        let storage = Storage::sqlite(db_url).await?;
        let cache: Arc<dyn FastCache> = match redis_url {
            Some(url) => {
                info!("using redis fast cache");
                Arc::new(RedisCache::connect(url).await?)
            }
            None => {
                info!("using in-process fast cache");
                Arc::new(InMemoryCache::with_clock(clock))
            }
        };
        Ok(Self::new(clock, storage, cache, collaborators, settings))
    }

    /// # Errors
    ///
    /// See [`ProgressSyncService::report_progress_at`].
    pub async fn report_progress(
        &self,
        report: &ProgressReport,
    ) -> Result<ReportOutcome, ProgressServiceError> {
        self.sync.report_progress_at(report, self.clock.now()).await
    }

    /// # Errors
    ///
    /// See [`QuizService::submit_quiz`].
    pub async fn submit_quiz(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
        course_id: Option<CourseId>,
        answers: &[QuizAnswer],
    ) -> Result<QuizSubmission, QuizServiceError> {
        self.quizzes
            .submit_quiz(student_id, chapter_id, course_id, answers)
            .await
    }

    /// # Errors
    ///
    /// See [`BadgeService::list_with_progress`].
    pub async fn get_badges(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<BadgeProgress>, BadgeServiceError> {
        self.badges.list_with_progress(student_id).await
    }

    /// # Errors
    ///
    /// See [`BadgeService::check_and_award`].
    pub async fn check_and_award_badges(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Badge>, BadgeServiceError> {
        self.badges.check_and_award(student_id).await
    }

    /// # Errors
    ///
    /// Returns `UnlockError` if progress or the chapter cannot be read.
    pub async fn check_unlock_condition(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<UnlockStatus, UnlockError> {
        let record = self.sync.get_progress(student_id, chapter_id).await?;
        self.unlock
            .check_unlock_condition(chapter_id, record.as_ref())
            .await
    }

    /// # Errors
    ///
    /// See [`ProgressSyncService::get_progress`].
    pub async fn get_progress(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<Option<ProgressRecord>, ProgressServiceError> {
        self.sync.get_progress(student_id, chapter_id).await
    }

    /// # Errors
    ///
    /// See [`ProgressSyncService::last_study_position`].
    pub async fn last_study_position(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, ProgressServiceError> {
        self.sync.last_study_position(student_id, course_id).await
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn sync(&self) -> Arc<ProgressSyncService> {
        Arc::clone(&self.sync)
    }

    #[must_use]
    pub fn unlock(&self) -> Arc<UnlockStateMachine> {
        Arc::clone(&self.unlock)
    }

    #[must_use]
    pub fn badges(&self) -> Arc<BadgeService> {
        Arc::clone(&self.badges)
    }

    #[must_use]
    pub fn quizzes(&self) -> Arc<QuizService> {
        Arc::clone(&self.quizzes)
    }
}
