use std::sync::Arc;

use chrono::Duration;
use progress_core::model::{
    Badge, BadgeCondition, BadgeId, Chapter, ChapterId, CourseId, ProgressRecord, ProgressReport,
    QuestionId, QuizAnswer, QuizQuestion, StudentId,
};
use progress_core::time::{fixed_clock, fixed_now};
use services::collaborators::{RecordingAssignmentUnlocker, RecordingEventPublisher};
use services::{Collaborators, EngineSettings, InMemoryViewCache, ProgressEngine, ReportOutcome};
use storage::cache::InMemoryCache;
use storage::repository::{
    BadgeRepository, ChapterRepository, InMemoryRepository, ProgressRepository, QuizRepository,
    Storage,
};

const STUDENT: StudentId = StudentId::new(3);
const CHAPTER: ChapterId = ChapterId::new(8);
const COURSE: CourseId = CourseId::new(2);

struct Harness {
    repo: InMemoryRepository,
    cache: InMemoryCache,
    events: RecordingEventPublisher,
    engine: ProgressEngine,
}

async fn harness(video_rate: f64) -> Harness {
    let repo = InMemoryRepository::new();
    repo.upsert_chapter(&Chapter::new(CHAPTER, "Ownership"))
        .await
        .unwrap();
    for (id, correct, points) in [(1, "borrow", 40), (2, "move", 30), (3, "Drop", 30)] {
        repo.upsert_question(&QuizQuestion {
            id: QuestionId::new(id),
            chapter_id: CHAPTER,
            correct_answer: correct.into(),
            points,
            sort_order: i32::try_from(id).unwrap(),
        })
        .await
        .unwrap();
    }
    for badge in [
        Badge::new(BadgeId::new(1), "First chapter", BadgeCondition::ChapterCompletionCount, 1),
        Badge::new(BadgeId::new(7), "Perfect quiz", BadgeCondition::PerfectQuizScore, 1),
    ] {
        repo.upsert_badge(&badge).await.unwrap();
    }

    let mut watched = ProgressRecord::new(STUDENT, CHAPTER);
    watched.apply_position(570, fixed_now() - Duration::seconds(120));
    watched.raise_video_rate(video_rate);
    repo.upsert_progress(&watched).await.unwrap();

    let cache = InMemoryCache::with_clock(fixed_clock());
    let events = RecordingEventPublisher::new();
    let engine = ProgressEngine::new(
        fixed_clock(),
        Storage::from_repo(repo.clone()),
        Arc::new(cache.clone()),
        Collaborators {
            events: Arc::new(events.clone()),
            assignments: Arc::new(RecordingAssignmentUnlocker::new()),
            views: Arc::new(InMemoryViewCache::new()),
        },
        &EngineSettings::default(),
    );
    Harness {
        repo,
        cache,
        events,
        engine,
    }
}

fn answers(first: &str, second: &str, third: &str) -> Vec<QuizAnswer> {
    vec![
        QuizAnswer::new(QuestionId::new(1), first),
        QuizAnswer::new(QuestionId::new(2), second),
        QuizAnswer::new(QuestionId::new(3), third),
    ]
}

async fn durable(h: &Harness) -> ProgressRecord {
    h.repo
        .get_progress(STUDENT, CHAPTER)
        .await
        .unwrap()
        .expect("record")
}

#[tokio::test]
async fn passing_quiz_records_points_and_unlocks() {
    let h = harness(0.95).await;

    let submission = h
        .engine
        .submit_quiz(STUDENT, CHAPTER, Some(COURSE), &answers(" Borrow ", "move", "clone"))
        .await
        .unwrap();

    assert!(submission.graded);
    assert_eq!(submission.score, 70);
    assert_eq!(submission.total_score, 100);
    assert_eq!(submission.percentage, 70);
    assert_eq!(submission.question_results.get(&QuestionId::new(3)), Some(&false));
    assert!(submission.unlock_triggered);

    let stored = durable(&h).await;
    assert_eq!(stored.quiz_score(), Some(70));
    assert_eq!(stored.quiz_submitted_at(), Some(fixed_now()));
    assert_eq!(stored.course_id(), Some(COURSE));
    assert!(stored.is_completed());
    assert_eq!(h.events.published().len(), 1);
}

#[tokio::test]
async fn failing_quiz_is_recorded_without_unlock_and_retake_unlocks() {
    let h = harness(0.95).await;

    let failed = h
        .engine
        .submit_quiz(STUDENT, CHAPTER, None, &answers("wrong", "move", "wrong"))
        .await
        .unwrap();
    assert_eq!(failed.score, 30);
    assert!(!failed.unlock_triggered);
    assert_eq!(durable(&h).await.quiz_score(), Some(30));
    assert!(!durable(&h).await.is_completed());

    let retake = h
        .engine
        .submit_quiz(STUDENT, CHAPTER, None, &answers("borrow", "move", "wrong"))
        .await
        .unwrap();
    assert!(retake.unlock_triggered);
    assert!(durable(&h).await.is_completed());
}

#[tokio::test]
async fn quiz_alone_does_not_unlock_unwatched_chapter() {
    let h = harness(0.4).await;
    let submission = h
        .engine
        .submit_quiz(STUDENT, CHAPTER, None, &answers("borrow", "move", "drop"))
        .await
        .unwrap();
    assert_eq!(submission.score, 100);
    assert!(!submission.unlock_triggered);
    assert!(h.events.published().is_empty());
}

#[tokio::test]
async fn chapter_without_questions_scores_full_marks_and_records_nothing() {
    let h = harness(0.95).await;
    let empty = ChapterId::new(50);

    let submission = h
        .engine
        .submit_quiz(STUDENT, empty, None, &[])
        .await
        .unwrap();

    assert!(!submission.graded);
    assert_eq!(submission.score, 100);
    assert_eq!(submission.total_score, 100);
    assert_eq!(submission.percentage, 100);
    assert!(submission.question_results.is_empty());
    assert!(h.repo.get_progress(STUDENT, empty).await.unwrap().is_none());
}

#[tokio::test]
async fn perfect_score_on_completion_awards_perfect_badge() {
    let h = harness(1.0).await;
    h.engine
        .submit_quiz(STUDENT, CHAPTER, None, &answers("borrow", "MOVE", "drop"))
        .await
        .unwrap();

    let earned: Vec<u64> = h
        .repo
        .achievements_for_student(STUDENT)
        .await
        .unwrap()
        .iter()
        .map(|a| a.badge_id.value())
        .collect();
    assert_eq!(earned, vec![1, 7]);

    let wall = h.engine.get_badges(STUDENT).await.unwrap();
    assert!(wall.iter().all(|b| b.earned));
}

#[tokio::test]
async fn quiz_missed_by_the_cache_still_counts_toward_unlock() {
    let h = harness(0.0).await;
    let heartbeat = |rate: f64| ProgressReport::new(STUDENT, CHAPTER, 570).with_rate(rate);
    let at = |seconds: i64| fixed_now() + Duration::seconds(seconds);

    h.engine
        .sync()
        .report_progress_at(&heartbeat(0.5), at(0))
        .await
        .unwrap();

    // The quiz lands in the store while the cached snapshot goes stale.
    h.cache.set_available(false);
    let submission = h
        .engine
        .submit_quiz(STUDENT, CHAPTER, None, &answers("borrow", "move", "drop"))
        .await
        .unwrap();
    assert_eq!(submission.score, 100);
    assert!(!submission.unlock_triggered);
    h.cache.set_available(true);

    let mut triggered = 0;
    for seconds in [40, 80, 120] {
        let outcome = h
            .engine
            .sync()
            .report_progress_at(&heartbeat(0.95), at(seconds))
            .await
            .unwrap();
        let ReportOutcome::Applied {
            snapshot,
            unlock_triggered,
            ..
        } = outcome
        else {
            panic!("heartbeat rejected");
        };
        assert_eq!(snapshot.quiz_score(), Some(100));
        triggered += usize::from(unlock_triggered);
    }

    let stored = durable(&h).await;
    assert!(stored.is_completed());
    assert_eq!(stored.completed_at(), Some(at(40)));
    assert_eq!(triggered, 1);
    assert_eq!(h.events.published().len(), 1);
}
