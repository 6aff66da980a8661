use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use progress_core::model::{Achievement, Badge, BadgeProgress, ProgressStats, StudentId};
use progress_core::time::Clock;
use storage::repository::{BadgeRepository, ProgressRepository};
use tracing::info;

use crate::error::BadgeServiceError;

/// Badge Rule Engine: awards achievements and projects progress toward the
/// rest of the catalog.
#[derive(Clone)]
pub struct BadgeService {
    clock: Clock,
    progress: Arc<dyn ProgressRepository>,
    badges: Arc<dyn BadgeRepository>,
    near_unlock_percent: u8,
}

impl BadgeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        progress: Arc<dyn ProgressRepository>,
        badges: Arc<dyn BadgeRepository>,
        near_unlock_percent: u8,
    ) -> Self {
        Self {
            clock,
            progress,
            badges,
            near_unlock_percent,
        }
    }

    async fn stats_for(&self, student_id: StudentId) -> Result<ProgressStats, BadgeServiceError> {
        let records = self.progress.list_by_student(student_id).await?;
        Ok(ProgressStats::from_records(&records))
    }

    /// Every catalog badge with the student's progress toward it.
    ///
    /// # Errors
    ///
    /// Returns `BadgeServiceError::Storage` if the catalog, achievements, or
    /// progress history cannot be read.
    pub async fn list_with_progress(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<BadgeProgress>, BadgeServiceError> {
        let catalog = self.badges.list_badges().await?;
        let earned: HashMap<_, Achievement> = self
            .badges
            .achievements_for_student(student_id)
            .await?
            .into_iter()
            .map(|a| (a.badge_id, a))
            .collect();
        let stats = self.stats_for(student_id).await?;

        Ok(catalog
            .into_iter()
            .map(|badge| {
                let achievement = earned.get(&badge.id);
                BadgeProgress::project(badge, achievement, &stats, self.near_unlock_percent)
            })
            .collect())
    }

    /// Award every badge the student now qualifies for and has not earned yet.
    ///
    /// Returns only the badges this call recorded; running it again without
    /// new progress returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns `BadgeServiceError::Storage` if reads or the achievement insert
    /// fail.
    pub async fn check_and_award(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Badge>, BadgeServiceError> {
        let catalog = self.badges.list_badges().await?;
        let already: HashSet<_> = self
            .badges
            .achievements_for_student(student_id)
            .await?
            .into_iter()
            .map(|a| a.badge_id)
            .collect();

        let pending: Vec<Badge> = catalog
            .into_iter()
            .filter(|b| !already.contains(&b.id))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let stats = self.stats_for(student_id).await?;
        let now = self.clock.now();
        let mut awarded = Vec::new();

        for badge in pending.into_iter().filter(|b| b.is_met_by(&stats)) {
            let achievement = Achievement {
                student_id,
                badge_id: badge.id,
                earned_at: now,
            };
            // A concurrent award of the same badge loses here and is not reported.
            if self.badges.insert_achievement(&achievement).await? {
                info!(%student_id, badge_id = %badge.id, badge = %badge.name, "badge awarded");
                awarded.push(badge);
            }
        }

        Ok(awarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use progress_core::model::{BadgeCondition, BadgeId, ChapterId, ProgressRecord};
    use progress_core::time::{fixed_clock, fixed_now};
    use storage::repository::InMemoryRepository;

    async fn seeded() -> (InMemoryRepository, BadgeService) {
        let repo = InMemoryRepository::new();
        for badge in [
            Badge::new(BadgeId::new(1), "First chapter", BadgeCondition::ChapterCompletionCount, 1),
            Badge::new(BadgeId::new(2), "Five chapters", BadgeCondition::ChapterCompletionCount, 5),
            Badge::new(BadgeId::new(3), "Three days", BadgeCondition::StudyDays, 3),
            Badge::new(BadgeId::new(4), "Perfect quiz", BadgeCondition::PerfectQuizScore, 1),
        ] {
            repo.upsert_badge(&badge).await.unwrap();
        }
        let service = BadgeService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            80,
        );
        (repo, service)
    }

    async fn complete_chapter(repo: &InMemoryRepository, chapter: u64, day: i64) {
        let mut r = ProgressRecord::new(StudentId::new(1), ChapterId::new(chapter));
        r.apply_position(600, fixed_now() + Duration::days(day));
        r.raise_video_rate(1.0);
        r.mark_completed(fixed_now() + Duration::days(day));
        repo.upsert_progress(&r).await.unwrap();
    }

    #[tokio::test]
    async fn award_is_idempotent() {
        let (repo, service) = seeded().await;
        complete_chapter(&repo, 1, 0).await;

        let first = service.check_and_award(StudentId::new(1)).await.unwrap();
        let ids: Vec<u64> = first.iter().map(|b| b.id.value()).collect();
        assert_eq!(ids, vec![1]);

        let second = service.check_and_award(StudentId::new(1)).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn listing_projects_progress_and_near_unlock() {
        let (repo, service) = seeded().await;
        for chapter in 1..=4 {
            complete_chapter(&repo, chapter, 0).await;
        }
        service.check_and_award(StudentId::new(1)).await.unwrap();

        let wall = service.list_with_progress(StudentId::new(1)).await.unwrap();
        let by_id: HashMap<u64, &BadgeProgress> =
            wall.iter().map(|p| (p.badge.id.value(), p)).collect();

        let first = by_id[&1];
        assert!(first.earned);
        assert_eq!(first.earned_at, Some(fixed_now()));
        assert_eq!(first.progress_percent, 100);

        let five = by_id[&2];
        assert!(!five.earned);
        assert_eq!(five.current_value, 4);
        assert_eq!(five.progress_percent, 80);
        assert!(five.near_unlock);

        let days = by_id[&3];
        assert_eq!(days.progress_percent, 33);
        assert!(!days.near_unlock);

        let perfect = by_id[&4];
        assert_eq!(perfect.progress_percent, 0);
    }

    #[tokio::test]
    async fn qualified_but_unrecorded_badge_lists_as_earned_without_date() {
        let (repo, service) = seeded().await;
        complete_chapter(&repo, 1, 0).await;

        let wall = service.list_with_progress(StudentId::new(1)).await.unwrap();
        let first = wall.iter().find(|p| p.badge.id == BadgeId::new(1)).unwrap();
        assert!(first.earned);
        assert_eq!(first.progress_percent, 100);
        assert_eq!(first.earned_at, None);
    }
}
