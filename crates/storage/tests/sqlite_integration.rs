use chrono::Duration;
use progress_core::model::{
    Achievement, Badge, BadgeCondition, BadgeId, Chapter, ChapterId, CourseId, ProgressRecord,
    QuestionId, QuizQuestion, StudentId,
};
use progress_core::time::fixed_now;
use storage::repository::{
    BadgeRepository, ChapterRepository, ProgressRepository, QuizRepository, StorageError,
};
use storage::sqlite::SqliteRepository;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn watched(chapter: u64, position: u32, rate: f64) -> ProgressRecord {
    let mut r = ProgressRecord::new(StudentId::new(1), ChapterId::new(chapter));
    r.set_course(Some(CourseId::new(7)));
    r.apply_position(position, fixed_now());
    r.raise_video_rate(rate);
    r
}

#[tokio::test]
async fn sqlite_progress_roundtrip_and_monotone_merge() {
    let repo = connect("memdb_progress_merge").await;

    repo.upsert_progress(&watched(1, 600, 0.6)).await.unwrap();

    let mut quizzed = watched(1, 620, 0.62);
    quizzed.record_quiz(75, fixed_now());
    repo.upsert_progress(&quizzed).await.unwrap();

    // Lower rate, no course, no quiz: none of those may regress.
    let mut stale = ProgressRecord::new(StudentId::new(1), ChapterId::new(1));
    stale.apply_position(100, fixed_now() + Duration::seconds(5));
    stale.raise_video_rate(0.1);
    let outcome = repo.upsert_progress(&stale).await.unwrap();

    let stored = repo
        .get_progress(StudentId::new(1), ChapterId::new(1))
        .await
        .unwrap()
        .expect("record");
    // The write hands back the merged row, not the snapshot it was given.
    assert_eq!(outcome.record, stored);
    assert_eq!(stored.video_rate(), 0.62);
    assert_eq!(stored.course_id(), Some(CourseId::new(7)));
    assert_eq!(stored.quiz_score(), Some(75));
    assert_eq!(stored.last_position_seconds(), 100);
    assert_eq!(
        stored.last_update_time(),
        Some(fixed_now() + Duration::seconds(5))
    );
    assert!(!stored.is_completed());
}

#[tokio::test]
async fn sqlite_completion_is_write_once() {
    let repo = connect("memdb_completion").await;
    repo.upsert_progress(&watched(2, 900, 0.95)).await.unwrap();

    let first = repo
        .mark_completed(StudentId::new(1), ChapterId::new(2), fixed_now())
        .await
        .unwrap();
    let second = repo
        .mark_completed(
            StudentId::new(1),
            ChapterId::new(2),
            fixed_now() + Duration::minutes(1),
        )
        .await
        .unwrap();
    assert!(first);
    assert!(!second);

    // A snapshot that predates completion cannot clear it.
    let outcome = repo.upsert_progress(&watched(2, 10, 0.2)).await.unwrap();
    assert!(!outcome.completed_now);

    let stored = repo
        .get_progress(StudentId::new(1), ChapterId::new(2))
        .await
        .unwrap()
        .unwrap();
    assert!(stored.is_completed());
    assert_eq!(stored.completed_at(), Some(fixed_now()));
    assert_eq!(stored.video_rate(), 0.95);
}

#[tokio::test]
async fn sqlite_upsert_of_completed_snapshot_reports_the_flip_once() {
    let repo = connect("memdb_completed_snapshot").await;
    let mut done = watched(3, 1_000, 1.0);
    done.mark_completed(fixed_now());

    let first = repo.upsert_progress(&done).await.unwrap();
    assert!(first.completed_now);
    assert!(first.record.is_completed());
    assert_eq!(first.record.completed_at(), Some(fixed_now()));
    assert!(!repo.upsert_progress(&done).await.unwrap().completed_now);
}

#[tokio::test]
async fn sqlite_mark_completed_without_record_is_not_found() {
    let repo = connect("memdb_not_found").await;
    let err = repo
        .mark_completed(StudentId::new(9), ChapterId::new(9), fixed_now())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound));
}

#[tokio::test]
async fn sqlite_course_listing_orders_by_last_update() {
    let repo = connect("memdb_course_listing").await;
    for (chapter, offset) in [(1_u64, 10_i64), (2, 30), (3, 20)] {
        let mut r = watched(chapter, 50, 0.1);
        r.apply_position(50, fixed_now() + Duration::seconds(offset));
        repo.upsert_progress(&r).await.unwrap();
    }
    let mut other_course = ProgressRecord::new(StudentId::new(1), ChapterId::new(4));
    other_course.set_course(Some(CourseId::new(8)));
    other_course.apply_position(1, fixed_now() + Duration::hours(1));
    repo.upsert_progress(&other_course).await.unwrap();

    let listed = repo
        .list_by_student_course(StudentId::new(1), CourseId::new(7))
        .await
        .unwrap();
    let order: Vec<u64> = listed.iter().map(|r| r.chapter_id().value()).collect();
    assert_eq!(order, vec![2, 3, 1]);

    assert_eq!(repo.list_by_student(StudentId::new(1)).await.unwrap().len(), 4);
}

#[tokio::test]
async fn sqlite_chapter_policy_overrides_roundtrip() {
    let repo = connect("memdb_chapters").await;
    let mut chapter = Chapter::new(ChapterId::new(5), "Ownership");
    chapter.course_id = Some(CourseId::new(7));
    chapter.unlock_quiz_score = Some(80);
    repo.upsert_chapter(&chapter).await.unwrap();

    let stored = repo.get_chapter(ChapterId::new(5)).await.unwrap().unwrap();
    assert_eq!(stored, chapter);
    let policy = stored.policy();
    assert_eq!(policy.required_video_rate(), 0.90);
    assert_eq!(policy.required_quiz_score(), 80);

    assert!(repo.get_chapter(ChapterId::new(6)).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_achievements_are_unique_and_unknown_badges_skipped() {
    let repo = connect("memdb_badges").await;
    let badge = Badge::new(
        BadgeId::new(1),
        "Five chapters",
        BadgeCondition::ChapterCompletionCount,
        5,
    )
    .with_icon("five.svg");
    repo.upsert_badge(&badge).await.unwrap();

    sqlx::query(
        "INSERT INTO badges (id, name, condition_type, condition_value) VALUES (2, 'Legacy', 'streak_weeks', 3)",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let badges = repo.list_badges().await.unwrap();
    assert_eq!(badges, vec![badge]);

    let achievement = Achievement {
        student_id: StudentId::new(1),
        badge_id: BadgeId::new(1),
        earned_at: fixed_now(),
    };
    assert!(repo.insert_achievement(&achievement).await.unwrap());
    let again = Achievement {
        earned_at: fixed_now() + Duration::days(1),
        ..achievement.clone()
    };
    assert!(!repo.insert_achievement(&again).await.unwrap());

    let earned = repo.achievements_for_student(StudentId::new(1)).await.unwrap();
    assert_eq!(earned, vec![achievement]);
}

#[tokio::test]
async fn sqlite_quiz_bank_is_ordered() {
    let repo = connect("memdb_quiz_bank").await;
    for (id, order) in [(1_u64, 3_i32), (2, 1), (3, 2)] {
        repo.upsert_question(&QuizQuestion {
            id: QuestionId::new(id),
            chapter_id: ChapterId::new(5),
            correct_answer: "A".into(),
            points: 10,
            sort_order: order,
        })
        .await
        .unwrap();
    }

    let questions = repo.questions_for_chapter(ChapterId::new(5)).await.unwrap();
    let ids: Vec<u64> = questions.iter().map(|q| q.id.value()).collect();
    assert_eq!(ids, vec![2, 3, 1]);
    assert!(
        repo.questions_for_chapter(ChapterId::new(6))
            .await
            .unwrap()
            .is_empty()
    );
}
