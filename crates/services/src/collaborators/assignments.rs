use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use progress_core::model::{ChapterId, StudentId};
use reqwest::Client;
use tracing::info;

use super::CollaboratorError;

/// Makes sure assignments gated on a chapter are open to a student.
///
/// "Ensure", not "unlock": calling it again for an already-unlocked pair must
/// succeed without side effects.
#[async_trait]
pub trait AssignmentUnlocker: Send + Sync {
    /// # Errors
    ///
    /// Returns `CollaboratorError` if the assignment service is unreachable or
    /// refuses the request.
    async fn ensure_unlocked(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<(), CollaboratorError>;
}

/// Calls the homework service over HTTP.
#[derive(Clone, Debug)]
pub struct HttpAssignmentUnlocker {
    client: Client,
    base_url: String,
}

impl HttpAssignmentUnlocker {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn unlock_url(&self) -> String {
        format!(
            "{}/api/homeworks/unlock",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl AssignmentUnlocker for HttpAssignmentUnlocker {
    async fn ensure_unlocked(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .post(self.unlock_url())
            .query(&[
                ("studentId", student_id.value()),
                ("chapterId", chapter_id.value()),
            ])
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Rejected(format!(
                "assignment unlock returned status {status}"
            )));
        }
        Ok(())
    }
}

/// Used when no assignment service is configured: the request is logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAssignmentUnlocker;

#[async_trait]
impl AssignmentUnlocker for LogAssignmentUnlocker {
    async fn ensure_unlocked(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<(), CollaboratorError> {
        info!(%student_id, %chapter_id, "assignment service not configured; unlock logged only");
        Ok(())
    }
}

/// Records every request, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct RecordingAssignmentUnlocker {
    calls: Arc<Mutex<Vec<(StudentId, ChapterId)>>>,
    failing: bool,
}

impl RecordingAssignmentUnlocker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts calls but answers each with `Rejected`.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            failing: true,
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<(StudentId, ChapterId)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl AssignmentUnlocker for RecordingAssignmentUnlocker {
    async fn ensure_unlocked(
        &self,
        student_id: StudentId,
        chapter_id: ChapterId,
    ) -> Result<(), CollaboratorError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((student_id, chapter_id));
        if self.failing {
            return Err(CollaboratorError::Rejected("homework service returned 503".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlock_url_tolerates_trailing_slash() {
        let unlocker = HttpAssignmentUnlocker::new("http://homework:8080/");
        assert_eq!(
            unlocker.unlock_url(),
            "http://homework:8080/api/homeworks/unlock"
        );
    }

    #[tokio::test]
    async fn unreachable_service_is_unavailable() {
        // Nothing listens on the discard port.
        let unlocker = HttpAssignmentUnlocker::new("http://127.0.0.1:9");
        let err = unlocker
            .ensure_unlocked(StudentId::new(1), ChapterId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Unavailable(_)));
    }
}
