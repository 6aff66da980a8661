use progress_core::model::{Chapter, ChapterId};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_chapter_row};
use crate::repository::{ChapterRepository, StorageError};

#[async_trait::async_trait]
impl ChapterRepository for SqliteRepository {
    async fn get_chapter(&self, id: ChapterId) -> Result<Option<Chapter>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, course_id, title, unlock_video_rate, unlock_quiz_score
            FROM chapters WHERE id = ?1
            ",
        )
        .bind(id_to_i64("chapter_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_chapter_row).transpose()
    }

    async fn upsert_chapter(&self, chapter: &Chapter) -> Result<(), StorageError> {
        let course = chapter
            .course_id
            .map(|c| id_to_i64("course_id", c.value()))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO chapters (id, course_id, title, unlock_video_rate, unlock_quiz_score)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                course_id = excluded.course_id,
                title = excluded.title,
                unlock_video_rate = excluded.unlock_video_rate,
                unlock_quiz_score = excluded.unlock_quiz_score
            ",
        )
        .bind(id_to_i64("chapter_id", chapter.id.value())?)
        .bind(course)
        .bind(chapter.title.as_str())
        .bind(chapter.unlock_video_rate)
        .bind(chapter.unlock_quiz_score.map(i64::from))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
