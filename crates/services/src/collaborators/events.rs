use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::model::{ChapterId, CourseId, StudentId};
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::CollaboratorError;

/// Stream that chapter completions are appended to.
pub const CHAPTER_COMPLETED_TOPIC: &str = "stream:edu:chapter-completed";
pub const CHAPTER_COMPLETED_TYPE: &str = "CHAPTER_COMPLETED";
pub const EVENT_SOURCE: &str = "progress-service";

/// Payload of a chapter-completed event. Consumers dedupe on
/// (student, chapter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterCompleted {
    pub student_id: StudentId,
    pub chapter_id: ChapterId,
    pub course_id: Option<CourseId>,
    pub chapter_title: Option<String>,
}

/// Uniform message wrapper shared by every event on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap a chapter completion with a fresh message id.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError::Rejected` if the payload cannot be encoded.
    pub fn chapter_completed(
        event: &ChapterCompleted,
        at: DateTime<Utc>,
    ) -> Result<Self, CollaboratorError> {
        let data = serde_json::to_value(event)
            .map_err(|e| CollaboratorError::Rejected(format!("event encoding failed: {e}")))?;
        Ok(Self {
            id: Uuid::new_v4(),
            event_type: CHAPTER_COMPLETED_TYPE.to_owned(),
            source: EVENT_SOURCE.to_owned(),
            timestamp: at,
            data,
        })
    }

    /// Decode the payload of a chapter-completed envelope.
    #[must_use]
    pub fn as_chapter_completed(&self) -> Option<ChapterCompleted> {
        if self.event_type != CHAPTER_COMPLETED_TYPE {
            return None;
        }
        serde_json::from_value(self.data.clone()).ok()
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Append one message to `topic`.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` if the bus is unreachable or refuses the
    /// message.
    async fn publish(&self, topic: &str, envelope: &EventEnvelope)
    -> Result<(), CollaboratorError>;
}

/// Publishes to Redis streams with `XADD`, one flat field map per message.
#[derive(Clone)]
pub struct RedisStreamPublisher {
    connection: ConnectionManager,
}

impl RedisStreamPublisher {
    /// # Errors
    ///
    /// Returns `CollaboratorError::Unavailable` if Redis cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, CollaboratorError> {
        let client =
            redis::Client::open(url).map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl EventPublisher for RedisStreamPublisher {
    async fn publish(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), CollaboratorError> {
        let data = serde_json::to_string(&envelope.data)
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
        let mut conn = self.connection.clone();
        let record_id: String = redis::cmd("XADD")
            .arg(topic)
            .arg("*")
            .arg("id")
            .arg(envelope.id.to_string())
            .arg("type")
            .arg(&envelope.event_type)
            .arg("source")
            .arg(&envelope.source)
            .arg("timestamp")
            .arg(envelope.timestamp.to_rfc3339())
            .arg("data")
            .arg(data)
            .query_async(&mut conn)
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        info!(stream = topic, record_id = %record_id, message_id = %envelope.id, "event published");
        Ok(())
    }
}

/// Publisher used when no event bus is configured: the event is only logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), CollaboratorError> {
        info!(
            stream = topic,
            message_id = %envelope.id,
            event_type = %envelope.event_type,
            data = %envelope.data,
            "event bus not configured; event logged only"
        );
        Ok(())
    }
}

/// In-memory publisher that keeps every message, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingEventPublisher {
    published: Arc<Mutex<Vec<(String, EventEnvelope)>>>,
    failing: bool,
}

impl RecordingEventPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every call fails with `Unavailable`.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            published: Arc::default(),
            failing: true,
        }
    }

    #[must_use]
    pub fn published(&self) -> Vec<(String, EventEnvelope)> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        topic: &str,
        envelope: &EventEnvelope,
    ) -> Result<(), CollaboratorError> {
        if self.failing {
            return Err(CollaboratorError::Unavailable("event bus down".into()));
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((topic.to_owned(), envelope.clone()));
        Ok(())
    }
}
