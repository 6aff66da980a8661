use progress_core::model::{Achievement, Badge, StudentId};

use super::SqliteRepository;
use super::mapping::{conn, id_to_i64, map_achievement_row, map_badge_row};
use crate::repository::{BadgeRepository, StorageError};

#[async_trait::async_trait]
impl BadgeRepository for SqliteRepository {
    async fn list_badges(&self) -> Result<Vec<Badge>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, name, description, icon, condition_type, condition_value
            FROM badges
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut badges = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(badge) = map_badge_row(row)? {
                badges.push(badge);
            }
        }
        Ok(badges)
    }

    async fn upsert_badge(&self, badge: &Badge) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO badges (id, name, description, icon, condition_type, condition_value)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                icon = excluded.icon,
                condition_type = excluded.condition_type,
                condition_value = excluded.condition_value
            ",
        )
        .bind(id_to_i64("badge_id", badge.id.value())?)
        .bind(badge.name.as_str())
        .bind(badge.description.as_deref())
        .bind(badge.icon.as_deref())
        .bind(badge.condition.as_str())
        .bind(i64::from(badge.condition_value))
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn achievements_for_student(
        &self,
        student_id: StudentId,
    ) -> Result<Vec<Achievement>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT student_id, badge_id, earned_at
            FROM student_badges
            WHERE student_id = ?1
            ORDER BY badge_id ASC
            ",
        )
        .bind(id_to_i64("student_id", student_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_achievement_row).collect()
    }

    async fn insert_achievement(&self, achievement: &Achievement) -> Result<bool, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO student_badges (student_id, badge_id, earned_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(student_id, badge_id) DO NOTHING
            ",
        )
        .bind(id_to_i64("student_id", achievement.student_id.value())?)
        .bind(id_to_i64("badge_id", achievement.badge_id.value())?)
        .bind(achievement.earned_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(res.rows_affected() == 1)
    }
}
