use chrono::{DateTime, Utc};
use progress_core::model::{ChapterId, CourseId, ProgressRecord, StudentId};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_progress_row};
use crate::repository::{ProgressRepository, StorageError, UpsertOutcome, completion_time};

const PROGRESS_COLUMNS: &str = r"
    student_id, chapter_id, course_id, watch_time_seconds, last_position_seconds, video_rate,
    last_update_time, quiz_score, quiz_submitted_at, is_completed, completed_at
";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM chapter_progress WHERE student_id = ?1 AND chapter_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("student_id", student_id.value())?)
            .bind(id_to_i64("chapter_id", chapter_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_progress_row).transpose()
    }

    async fn upsert_progress(&self, record: &ProgressRecord) -> Result<UpsertOutcome, StorageError> {
        let student = id_to_i64("student_id", record.student_id().value())?;
        let chapter = id_to_i64("chapter_id", record.chapter_id().value())?;
        let course = record
            .course_id()
            .map(|c| id_to_i64("course_id", c.value()))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        // Completion columns are never written here; see the conditional update below.
        let sql = format!(
            r"
            INSERT INTO chapter_progress (
                student_id, chapter_id, course_id, watch_time_seconds, last_position_seconds,
                video_rate, last_update_time, quiz_score, quiz_submitted_at, is_completed, completed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, NULL)
            ON CONFLICT(student_id, chapter_id) DO UPDATE SET
                course_id = COALESCE(excluded.course_id, chapter_progress.course_id),
                watch_time_seconds = excluded.watch_time_seconds,
                last_position_seconds = excluded.last_position_seconds,
                video_rate = MAX(chapter_progress.video_rate, excluded.video_rate),
                last_update_time = COALESCE(excluded.last_update_time, chapter_progress.last_update_time),
                quiz_score = COALESCE(excluded.quiz_score, chapter_progress.quiz_score),
                quiz_submitted_at = COALESCE(excluded.quiz_submitted_at, chapter_progress.quiz_submitted_at)
            RETURNING {PROGRESS_COLUMNS}
            "
        );
        let merged = sqlx::query(&sql)
            .bind(student)
            .bind(chapter)
            .bind(course)
            .bind(i64::from(record.watch_time_seconds()))
            .bind(i64::from(record.last_position_seconds()))
            .bind(record.video_rate())
            .bind(record.last_update_time())
            .bind(record.quiz_score().map(i64::from))
            .bind(record.quiz_submitted_at())
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        let mut stored = map_progress_row(&merged)?;

        let mut completed_now = false;
        if record.is_completed() {
            let sql = format!(
                r"
                UPDATE chapter_progress
                SET is_completed = 1, completed_at = ?3
                WHERE student_id = ?1 AND chapter_id = ?2 AND is_completed = 0
                RETURNING {PROGRESS_COLUMNS}
                "
            );
            let flipped = sqlx::query(&sql)
                .bind(student)
                .bind(chapter)
                .bind(completion_time(record))
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn)?;
            if let Some(row) = flipped {
                stored = map_progress_row(&row)?;
                completed_now = true;
            }
        }

        tx.commit().await.map_err(conn)?;
        Ok(UpsertOutcome {
            record: stored,
            completed_now,
        })
    }

    async fn mark_completed(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let student = id_to_i64("student_id", student_id.value())?;
        let chapter = id_to_i64("chapter_id", chapter_id.value())?;

        let res = sqlx::query(
            r"
            UPDATE chapter_progress
            SET is_completed = 1, completed_at = ?3
            WHERE student_id = ?1 AND chapter_id = ?2 AND is_completed = 0
            ",
        )
        .bind(student)
        .bind(chapter)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM chapter_progress WHERE student_id = ?1 AND chapter_id = ?2")
            .bind(student)
            .bind(chapter)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;
        if exists.is_some() {
            Ok(false)
        } else {
            Err(StorageError::NotFound)
        }
    }

    async fn list_by_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM chapter_progress WHERE student_id = ?1 ORDER BY chapter_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_to_i64("student_id", student_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }

    async fn list_by_student_course(
        &self,
        student_id: StudentId,
        course_id: CourseId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let sql = format!(
            r"
            SELECT {PROGRESS_COLUMNS} FROM chapter_progress
            WHERE student_id = ?1 AND course_id = ?2
            ORDER BY last_update_time DESC, chapter_id ASC
            "
        );
        let rows = sqlx::query(&sql)
            .bind(id_to_i64("student_id", student_id.value())?)
            .bind(id_to_i64("course_id", course_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_progress_row).collect()
    }
}
