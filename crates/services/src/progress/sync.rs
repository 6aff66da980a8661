use std::sync::Arc;

use chrono::{DateTime, Utc};
use progress_core::model::{ChapterId, CourseId, ProgressRecord, ProgressReport, StudentId};
use progress_core::time::Clock;
use progress_core::{CheatPolicy, CheatVerdict};
use serde::{Deserialize, Serialize};
use storage::repository::{ProgressRepository, UpsertOutcome};
use tracing::{debug, info, warn};

use super::snapshot::SnapshotCache;
use crate::error::ProgressServiceError;
use crate::unlock::UnlockStateMachine;
use crate::view_cache::ViewCache;

/// Why a heartbeat was refused. Nothing was mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheatRejection {
    pub elapsed_seconds: i64,
    pub reported_delta_seconds: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReportOutcome {
    Applied {
        snapshot: ProgressRecord,
        flushed: bool,
        unlock_triggered: bool,
    },
    Rejected(CheatRejection),
}

impl ReportOutcome {
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&ProgressRecord> {
        match self {
            Self::Applied { snapshot, .. } => Some(snapshot),
            Self::Rejected(_) => None,
        }
    }
}

/// Whether a durable write is due for a key last synced at `last_sync`.
///
/// A key that was never synced (or whose marker was lost) is always due.
#[must_use]
pub fn flush_due(last_sync: Option<DateTime<Utc>>, now: DateTime<Utc>, interval_millis: i64) -> bool {
    match last_sync {
        Some(at) => now.signed_duration_since(at).num_milliseconds() >= interval_millis,
        None => true,
    }
}

/// Progress Cache & Sync Layer: absorbs heartbeats in the fast cache and
/// writes behind to the durable store on a bounded interval.
pub struct ProgressSyncService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    snapshots: SnapshotCache,
    unlock: Arc<UnlockStateMachine>,
    views: Arc<dyn ViewCache>,
    cheat_policy: CheatPolicy,
    sync_interval_millis: i64,
}

impl ProgressSyncService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        snapshots: SnapshotCache,
        unlock: Arc<UnlockStateMachine>,
        views: Arc<dyn ViewCache>,
        cheat_policy: CheatPolicy,
        sync_interval_millis: i64,
    ) -> Self {
        Self {
            clock,
            progress,
            snapshots,
            unlock,
            views,
            cheat_policy,
            sync_interval_millis,
        }
    }

    #[must_use]
    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }

    /// Apply a heartbeat at the service clock's current time.
    ///
    /// # Errors
    ///
    /// See [`Self::report_progress_at`].
    pub async fn report_progress(
        &self,
        report: &ProgressReport,
    ) -> Result<ReportOutcome, ProgressServiceError> {
        self.report_progress_at(report, self.clock.now()).await
    }

    /// Apply a heartbeat judged against the server time `now`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::InvalidReport` for malformed input and
    /// `ProgressServiceError::Storage` when the durable store cannot be read on
    /// a cache miss or cannot be written on a due flush.
    pub async fn report_progress_at(
        &self,
        report: &ProgressReport,
        now: DateTime<Utc>,
    ) -> Result<ReportOutcome, ProgressServiceError> {
        report.validate()?;
        let student_id = report.student_id;
        let chapter_id = report.chapter_id;

        let mut snapshot = self.load_snapshot(student_id, chapter_id).await?;

        if let CheatVerdict::Suspicious {
            elapsed_seconds,
            reported_delta_seconds,
        } = self.cheat_policy.judge(&snapshot, report.current_position, now)
        {
            warn!(
                %student_id,
                %chapter_id,
                elapsed_seconds,
                reported_delta_seconds,
                "progress report rejected: position advanced faster than playback allows"
            );
            return Ok(ReportOutcome::Rejected(CheatRejection {
                elapsed_seconds,
                reported_delta_seconds,
            }));
        }

        snapshot.set_course(report.course_id);
        snapshot.apply_position(report.current_position, now);
        if let Some(rate) = report.candidate_rate() {
            snapshot.raise_video_rate(rate);
        }
        let newly_completed = report.completed && snapshot.mark_completed(now);

        let due = newly_completed
            || flush_due(
                self.snapshots.last_sync(student_id, chapter_id).await,
                now,
                self.sync_interval_millis,
            );

        let mut unlock_triggered = false;
        if due {
            let UpsertOutcome {
                record,
                completed_now,
            } = self.flush(&snapshot, now).await?;
            // Judge and cache what the store holds, not the request's copy.
            snapshot = record;
            unlock_triggered = self
                .unlock
                .on_flush(&mut snapshot, completed_now, now)
                .await
                .transitioned;
        } else {
            debug!(%student_id, %chapter_id, "flush not due; cache only");
        }

        self.snapshots.store(&snapshot).await;

        Ok(ReportOutcome::Applied {
            snapshot,
            flushed: due,
            unlock_triggered,
        })
    }

    /// Persist a snapshot, stamp the sync marker and evict derived views.
    ///
    /// The returned outcome carries the merged durable record.
    pub(crate) async fn flush(
        &self,
        snapshot: &ProgressRecord,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, ProgressServiceError> {
        let outcome = self.progress.upsert_progress(snapshot).await?;
        self.snapshots
            .mark_synced(snapshot.student_id(), snapshot.chapter_id(), now)
            .await;
        self.views.evict(snapshot.student_id());
        info!(
            student_id = %snapshot.student_id(),
            chapter_id = %snapshot.chapter_id(),
            video_rate = snapshot.video_rate(),
            completed_now = outcome.completed_now,
            "progress flushed"
        );
        Ok(outcome)
    }

    /// Cache first, then the durable store, then a fresh zero record.
    pub(crate) async fn load_snapshot(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<ProgressRecord, ProgressServiceError> {
        if let Some(record) = self.snapshots.load(student_id, chapter_id).await {
            return Ok(record);
        }
        Ok(self
            .progress
            .get_progress(student_id, chapter_id)
            .await?
            .unwrap_or_else(|| ProgressRecord::new(student_id, chapter_id)))
    }

    /// Current progress of one pair, or `None` if the student never started it.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the store cannot be read on a
    /// cache miss.
    pub async fn get_progress(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<Option<ProgressRecord>, ProgressServiceError> {
        if let Some(record) = self.snapshots.load(student_id, chapter_id).await {
            return Ok(Some(record));
        }
        Ok(self.progress.get_progress(student_id, chapter_id).await?)
    }

    /// The most recently updated record of a course, i.e. where the student
    /// should resume.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the store cannot be read.
    pub async fn last_study_position(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Option<ProgressRecord>, ProgressServiceError> {
        let records = self
            .progress
            .list_by_student_course(student_id, course_id)
            .await?;
        Ok(records.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::time::fixed_now;

    const THIRTY_SECONDS: i64 = 30_000;

    #[test]
    fn never_synced_is_due() {
        assert!(flush_due(None, fixed_now(), THIRTY_SECONDS));
    }

    #[test]
    fn due_exactly_at_interval() {
        let last = fixed_now();
        assert!(!flush_due(
            Some(last),
            last + Duration::seconds(29),
            THIRTY_SECONDS
        ));
        assert!(flush_due(
            Some(last),
            last + Duration::seconds(30),
            THIRTY_SECONDS
        ));
    }

    #[test]
    fn marker_in_the_future_is_not_due() {
        let last = fixed_now() + Duration::seconds(10);
        assert!(!flush_due(Some(last), fixed_now(), THIRTY_SECONDS));
    }
}
