use chrono::{DateTime, Utc};
use progress_core::model::{
    Achievement, Badge, BadgeCondition, BadgeId, Chapter, ChapterId, CourseId, ProgressRecord,
    QuestionId, QuizQuestion, StudentId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<ProgressRecord, StorageError> {
    let student_id = StudentId::new(i64_to_u64("student_id", row.try_get("student_id").map_err(ser)?)?);
    let chapter_id = ChapterId::new(i64_to_u64("chapter_id", row.try_get("chapter_id").map_err(ser)?)?);
    let course_id = row
        .try_get::<Option<i64>, _>("course_id")
        .map_err(ser)?
        .map(|v| i64_to_u64("course_id", v).map(CourseId::new))
        .transpose()?;
    let watch_time = i64_to_u32(
        "watch_time_seconds",
        row.try_get("watch_time_seconds").map_err(ser)?,
    )?;
    let last_position = i64_to_u32(
        "last_position_seconds",
        row.try_get("last_position_seconds").map_err(ser)?,
    )?;
    let video_rate: f64 = row.try_get("video_rate").map_err(ser)?;
    let last_update_time: Option<DateTime<Utc>> = row.try_get("last_update_time").map_err(ser)?;
    let quiz_score = row
        .try_get::<Option<i64>, _>("quiz_score")
        .map_err(ser)?
        .map(|v| i64_to_u32("quiz_score", v))
        .transpose()?;
    let quiz_submitted_at: Option<DateTime<Utc>> =
        row.try_get("quiz_submitted_at").map_err(ser)?;
    let is_completed = row.try_get::<i64, _>("is_completed").map_err(ser)? != 0;
    let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at").map_err(ser)?;

    Ok(ProgressRecord::from_persisted(
        student_id,
        chapter_id,
        course_id,
        watch_time,
        last_position,
        video_rate,
        last_update_time,
        quiz_score,
        quiz_submitted_at,
        is_completed,
        completed_at,
    ))
}

pub(crate) fn map_chapter_row(row: &SqliteRow) -> Result<Chapter, StorageError> {
    let id = ChapterId::new(i64_to_u64("chapter_id", row.try_get("id").map_err(ser)?)?);
    let course_id = row
        .try_get::<Option<i64>, _>("course_id")
        .map_err(ser)?
        .map(|v| i64_to_u64("course_id", v).map(CourseId::new))
        .transpose()?;
    let title: String = row.try_get("title").map_err(ser)?;
    let unlock_video_rate: Option<f64> = row.try_get("unlock_video_rate").map_err(ser)?;
    let unlock_quiz_score = row
        .try_get::<Option<i64>, _>("unlock_quiz_score")
        .map_err(ser)?
        .map(|v| i64_to_u32("unlock_quiz_score", v))
        .transpose()?;

    Ok(Chapter {
        id,
        course_id,
        title,
        unlock_video_rate,
        unlock_quiz_score,
    })
}

/// Returns `Ok(None)` for a row whose condition type this build does not know.
pub(crate) fn map_badge_row(row: &SqliteRow) -> Result<Option<Badge>, StorageError> {
    let id = BadgeId::new(i64_to_u64("badge_id", row.try_get("id").map_err(ser)?)?);
    let condition_type: String = row.try_get("condition_type").map_err(ser)?;
    let Ok(condition) = condition_type.parse::<BadgeCondition>() else {
        tracing::warn!(badge_id = %id, condition_type = %condition_type, "skipping badge with unknown condition type");
        return Ok(None);
    };
    let condition_value = i64_to_u32(
        "condition_value",
        row.try_get("condition_value").map_err(ser)?,
    )?;

    Ok(Some(Badge {
        id,
        name: row.try_get("name").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        icon: row.try_get("icon").map_err(ser)?,
        condition,
        condition_value,
    }))
}

pub(crate) fn map_achievement_row(row: &SqliteRow) -> Result<Achievement, StorageError> {
    Ok(Achievement {
        student_id: StudentId::new(i64_to_u64("student_id", row.try_get("student_id").map_err(ser)?)?),
        badge_id: BadgeId::new(i64_to_u64("badge_id", row.try_get("badge_id").map_err(ser)?)?),
        earned_at: row.try_get("earned_at").map_err(ser)?,
    })
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<QuizQuestion, StorageError> {
    let sort_order: i64 = row.try_get("sort_order").map_err(ser)?;
    Ok(QuizQuestion {
        id: QuestionId::new(i64_to_u64("question_id", row.try_get("id").map_err(ser)?)?),
        chapter_id: ChapterId::new(i64_to_u64("chapter_id", row.try_get("chapter_id").map_err(ser)?)?),
        correct_answer: row.try_get("correct_answer").map_err(ser)?,
        points: i64_to_u32("points", row.try_get("points").map_err(ser)?)?,
        sort_order: i32::try_from(sort_order)
            .map_err(|_| StorageError::Serialization(format!("invalid sort_order: {sort_order}")))?,
    })
}
