use progress_core::model::{
    Badge, BadgeCondition, BadgeId, Chapter, ChapterId, CourseId, QuestionId, QuizQuestion,
};
use storage::Storage;
use storage::repository::{BadgeRepository, ChapterRepository, QuizRepository};
use tracing::info;

const DEMO_COURSE: CourseId = CourseId::new(1);

/// Default badge catalog.
#[must_use]
pub fn default_badges() -> Vec<Badge> {
    use BadgeCondition::{ChapterCompletionCount, PerfectQuizScore, StudyDays};

    vec![
        Badge::new(BadgeId::new(1), "First Steps", ChapterCompletionCount, 1)
            .with_description("Complete your first chapter"),
        Badge::new(BadgeId::new(2), "Getting Going", ChapterCompletionCount, 5)
            .with_description("Complete 5 chapters"),
        Badge::new(BadgeId::new(3), "Bookworm", ChapterCompletionCount, 20)
            .with_description("Complete 20 chapters"),
        Badge::new(BadgeId::new(4), "Three Day Streak", StudyDays, 3)
            .with_description("Study on 3 different days"),
        Badge::new(BadgeId::new(5), "Week of Study", StudyDays, 7)
            .with_description("Study on 7 different days"),
        Badge::new(BadgeId::new(6), "Month of Study", StudyDays, 30)
            .with_description("Study on 30 different days"),
        Badge::new(BadgeId::new(7), "Flawless", PerfectQuizScore, 1)
            .with_description("Score full marks on a quiz"),
    ]
}

/// Demo course chapters. The last one overrides both thresholds.
#[must_use]
pub fn demo_chapters() -> Vec<Chapter> {
    let titles = ["Getting started", "Ownership", "Traits in practice"];
    let mut chapters: Vec<Chapter> = titles
        .iter()
        .zip(1_u64..)
        .map(|(title, id)| {
            let mut chapter = Chapter::new(ChapterId::new(id), *title);
            chapter.course_id = Some(DEMO_COURSE);
            chapter
        })
        .collect();
    if let Some(last) = chapters.last_mut() {
        last.unlock_video_rate = Some(0.8);
        last.unlock_quiz_score = Some(70);
    }
    chapters
}

#[must_use]
pub fn demo_questions() -> Vec<QuizQuestion> {
    [(1, "cargo", 30), (2, "main", 30), (3, "println", 40)]
        .into_iter()
        .zip(1_i32..)
        .map(|((id, answer, points), sort_order)| QuizQuestion {
            id: QuestionId::new(id),
            chapter_id: ChapterId::new(1),
            correct_answer: answer.to_owned(),
            points,
            sort_order,
        })
        .collect()
}

/// Install the catalog and demo content. Safe to run repeatedly.
///
/// # Errors
///
/// Fails on the first write the store refuses.
pub async fn seed(storage: &Storage) -> anyhow::Result<SeedSummary> {
    let badges = default_badges();
    for badge in &badges {
        storage.badges.upsert_badge(badge).await?;
    }
    let chapters = demo_chapters();
    for chapter in &chapters {
        storage.chapters.upsert_chapter(chapter).await?;
    }
    let questions = demo_questions();
    for question in &questions {
        storage.quizzes.upsert_question(question).await?;
    }

    let summary = SeedSummary {
        badges: badges.len(),
        chapters: chapters.len(),
        questions: questions.len(),
    };
    info!(
        badges = summary.badges,
        chapters = summary.chapters,
        questions = summary.questions,
        "seed complete"
    );
    Ok(summary)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SeedSummary {
    pub badges: usize,
    pub chapters: usize,
    pub questions: usize,
}
