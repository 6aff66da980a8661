mod badge;
mod ids;
mod policy;
mod progress;
mod quiz;

pub use ids::{BadgeId, ChapterId, CourseId, ParseIdError, QuestionId, StudentId};

pub use badge::{
    Achievement, Badge, BadgeCondition, BadgeConditionError, BadgeProgress, ProgressStats,
    DEFAULT_NEAR_UNLOCK_PERCENT, PERFECT_QUIZ_SCORE,
};
pub use policy::{
    Chapter, GuardCheck, UnlockPolicy, DEFAULT_REQUIRED_QUIZ_SCORE, DEFAULT_REQUIRED_VIDEO_RATE,
};
pub use progress::{ProgressError, ProgressRecord, ProgressReport};
pub use quiz::{grade_quiz, QuizAnswer, QuizGrade, QuizQuestion};
