use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY,
            course_id INTEGER,
            title TEXT NOT NULL,
            unlock_video_rate REAL CHECK (unlock_video_rate BETWEEN 0 AND 1),
            unlock_quiz_score INTEGER CHECK (unlock_quiz_score >= 0)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS chapter_progress (
            student_id INTEGER NOT NULL,
            chapter_id INTEGER NOT NULL,
            course_id INTEGER,
            watch_time_seconds INTEGER NOT NULL DEFAULT 0 CHECK (watch_time_seconds >= 0),
            last_position_seconds INTEGER NOT NULL DEFAULT 0 CHECK (last_position_seconds >= 0),
            video_rate REAL NOT NULL DEFAULT 0 CHECK (video_rate BETWEEN 0 AND 1),
            last_update_time TEXT,
            quiz_score INTEGER,
            quiz_submitted_at TEXT,
            is_completed INTEGER NOT NULL DEFAULT 0 CHECK (is_completed IN (0, 1)),
            completed_at TEXT,
            PRIMARY KEY (student_id, chapter_id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS badges (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            icon TEXT,
            condition_type TEXT NOT NULL,
            condition_value INTEGER NOT NULL CHECK (condition_value >= 0)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS student_badges (
            student_id INTEGER NOT NULL,
            badge_id INTEGER NOT NULL,
            earned_at TEXT NOT NULL,
            PRIMARY KEY (student_id, badge_id),
            FOREIGN KEY (badge_id) REFERENCES badges(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS chapter_quizzes (
            id INTEGER PRIMARY KEY,
            chapter_id INTEGER NOT NULL,
            correct_answer TEXT NOT NULL,
            points INTEGER NOT NULL CHECK (points >= 0),
            sort_order INTEGER NOT NULL DEFAULT 0
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_student_course_updated
            ON chapter_progress (student_id, course_id, last_update_time);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quizzes_chapter_order
            ON chapter_quizzes (chapter_id, sort_order, id);
    ",
];

/// Applies versioned migrations, each inside its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: progress, chapter policies, badge catalog, achievements, quiz bank.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
