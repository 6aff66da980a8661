#![forbid(unsafe_code)]

pub mod badge_service;
pub mod collaborators;
pub mod engine;
pub mod error;
pub mod progress;
pub mod quiz_service;
pub mod settings;
pub mod unlock;
pub mod view_cache;

pub use progress_core::Clock;

pub use badge_service::BadgeService;
pub use engine::{Collaborators, ProgressEngine};
pub use error::{
    BadgeServiceError, CollaboratorError, EngineError, ProgressServiceError, QuizServiceError,
    SettingsError, UnlockError,
};
pub use progress::{CheatRejection, ProgressSyncService, ReportOutcome, SnapshotCache};
pub use quiz_service::{QuizService, QuizSubmission};
pub use settings::EngineSettings;
pub use unlock::{UnlockOutcome, UnlockStateMachine, UnlockStatus};
pub use view_cache::{InMemoryViewCache, ViewCache};
