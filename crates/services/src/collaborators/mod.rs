//! Downstream collaborators called by the unlock state machine.
//!
//! Every call is best-effort and single-attempt: the caller logs failures and
//! moves on, so implementations must not retry internally.

mod assignments;
mod events;

pub use crate::error::CollaboratorError;
pub use assignments::{
    AssignmentUnlocker, HttpAssignmentUnlocker, LogAssignmentUnlocker,
    RecordingAssignmentUnlocker,
};
pub use events::{
    CHAPTER_COMPLETED_TOPIC, CHAPTER_COMPLETED_TYPE, ChapterCompleted, EVENT_SOURCE, EventEnvelope,
    EventPublisher, LogEventPublisher, RecordingEventPublisher, RedisStreamPublisher,
};
