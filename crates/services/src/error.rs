//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::model::ProgressError;
use storage::cache::CacheError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Failure of a downstream collaborator (event bus, assignment service).
///
/// Always caught and logged by the unlock state machine; never propagated
/// to the caller of a progress operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CollaboratorError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
}

/// Engine settings that would make the anti-cheat window meaningless.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("cheat_speed_tolerance must be a finite, non-negative number, got {0}")]
    SpeedTolerance(f64),
    #[error("cheat_grace_secs must not be negative, got {0}")]
    GraceSeconds(i64),
}

/// Errors emitted by `ProgressSyncService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error(transparent)]
    InvalidReport(#[from] ProgressError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `BadgeService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BadgeServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Progress(#[from] ProgressServiceError),
}

/// Errors emitted while reporting the unlock guard.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnlockError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Progress(#[from] ProgressServiceError),
}

/// Errors emitted while wiring the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}
