use progress_core::model::{ChapterId, QuizQuestion};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_question_row};
use crate::repository::{QuizRepository, StorageError};

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn questions_for_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Vec<QuizQuestion>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, chapter_id, correct_answer, points, sort_order
            FROM chapter_quizzes
            WHERE chapter_id = ?1
            ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(id_to_i64("chapter_id", chapter_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_question_row).collect()
    }

    async fn upsert_question(&self, question: &QuizQuestion) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO chapter_quizzes (id, chapter_id, correct_answer, points, sort_order)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                chapter_id = excluded.chapter_id,
                correct_answer = excluded.correct_answer,
                points = excluded.points,
                sort_order = excluded.sort_order
            ",
        )
        .bind(id_to_i64("question_id", question.id.value())?)
        .bind(id_to_i64("chapter_id", question.chapter_id.value())?)
        .bind(question.correct_answer.as_str())
        .bind(i64::from(question.points))
        .bind(i64::from(question.sort_order))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
