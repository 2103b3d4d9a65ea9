use uuid::Uuid;

/// Validation failures raised before anything touches the database.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DomainError {
    #[error("age must be between 6 and 18, got {0}")]
    InvalidAge(i32),
    #[error("unknown gender '{0}' (expected male or female)")]
    UnknownGender(String),
    #[error("unknown education stage '{0}' (expected elementary, middle or high)")]
    UnknownStage(String),
    #[error("unknown subject '{0}'")]
    UnknownSubject(String),
    #[error("unknown emotion label '{0}'")]
    UnknownEmotion(String),
    #[error("attention level must be 1, 2 or 3, got {0}")]
    InvalidAttention(i32),
    #[error("confidence must be within [0, 1], got {0}")]
    InvalidConfidence(f64),
    #[error("planned duration must be positive, got {0} minutes")]
    InvalidDuration(i32),
    #[error("session duration cannot be negative, got {0} minutes")]
    NegativeDuration(i32),
    #[error("average attention must be within [1, 3], got {0}")]
    InvalidAverageAttention(f64),
    #[error("average emotion score must be within [0, 1], got {0}")]
    InvalidEmotionScore(f64),
    #[error("average attention and emotion score must both be set or both be empty")]
    PartialScore,
    #[error("account already has the maximum of {0} learners")]
    LearnerLimitReached(i64),
    #[error("learner already has an active session {0}")]
    SessionAlreadyActive(Uuid),
    #[error("session {0} is already finalized")]
    SessionFinalized(Uuid),
    #[error("invalid calendar month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
}
