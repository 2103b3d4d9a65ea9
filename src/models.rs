use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

pub const MIN_LEARNER_AGE: i32 = 6;
pub const MAX_LEARNER_AGE: i32 = 18;
pub const MAX_LEARNERS_PER_ACCOUNT: i64 = 4;

/// Labels the external classifier may report for a sample.
pub const EMOTION_LABELS: [&str; 7] = [
    "Angry", "Disgust", "Fear", "Happy", "Sad", "Surprise", "Neutral",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }
}

impl FromStr for Gender {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            _ => Err(DomainError::UnknownGender(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EducationStage {
    Elementary,
    Middle,
    High,
}

impl EducationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            EducationStage::Elementary => "elementary",
            EducationStage::Middle => "middle",
            EducationStage::High => "high",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EducationStage::Elementary => "Elementary school",
            EducationStage::Middle => "Middle school",
            EducationStage::High => "High school",
        }
    }
}

impl FromStr for EducationStage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "elementary" => Ok(EducationStage::Elementary),
            "middle" => Ok(EducationStage::Middle),
            "high" => Ok(EducationStage::High),
            _ => Err(DomainError::UnknownStage(value.to_string())),
        }
    }
}

/// Study subject. Codes outside the catalogue are kept verbatim so stored
/// history never fails to load; they sort after the catalogue entries.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Subject {
    Math,
    Science,
    Language,
    Social,
    Art,
    Cs,
    Other(String),
}

impl Subject {
    /// Lenient parse used when reading history.
    pub fn from_code(code: &str) -> Subject {
        match code.trim().to_ascii_lowercase().as_str() {
            "math" => Subject::Math,
            "science" => Subject::Science,
            "language" => Subject::Language,
            "social" => Subject::Social,
            "art" => Subject::Art,
            "cs" => Subject::Cs,
            _ => Subject::Other(code.to_string()),
        }
    }

    /// Strict parse used when starting a new session.
    pub fn known(code: &str) -> Result<Subject, DomainError> {
        match Subject::from_code(code) {
            Subject::Other(raw) => Err(DomainError::UnknownSubject(raw)),
            subject => Ok(subject),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Subject::Math => "math",
            Subject::Science => "science",
            Subject::Language => "language",
            Subject::Social => "social",
            Subject::Art => "art",
            Subject::Cs => "cs",
            Subject::Other(raw) => raw,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Subject::Math => "Math",
            Subject::Science => "Science",
            Subject::Language => "Language Arts",
            Subject::Social => "Social Studies",
            Subject::Art => "Art",
            Subject::Cs => "Computer Science",
            Subject::Other(raw) => raw,
        }
    }

    /// Calendar colour for days this subject wins.
    pub fn color(&self) -> &'static str {
        match self {
            Subject::Math => "#3498DB",
            Subject::Science => "#2ECC71",
            Subject::Language => "#E74C3C",
            Subject::Social => "#F39C12",
            Subject::Art => "#9B59B6",
            Subject::Cs => "#1ABC9C",
            Subject::Other(_) => NEUTRAL_COLOR,
        }
    }
}

pub const NEUTRAL_COLOR: &str = "#95A5A6";

impl From<String> for Subject {
    fn from(code: String) -> Self {
        Subject::from_code(&code)
    }
}

impl From<Subject> for String {
    fn from(subject: Subject) -> Self {
        subject.code().to_string()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Profile fields supplied when creating or editing a learner.
#[derive(Debug, Clone)]
pub struct LearnerProfile {
    pub nickname: String,
    pub gender: Gender,
    pub age: i32,
    pub education_stage: EducationStage,
}

impl LearnerProfile {
    pub fn validate(&self) -> Result<(), DomainError> {
        if !(MIN_LEARNER_AGE..=MAX_LEARNER_AGE).contains(&self.age) {
            return Err(DomainError::InvalidAge(self.age));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Learner {
    pub id: Uuid,
    pub account_id: Uuid,
    pub nickname: String,
    pub gender: Gender,
    pub age: i32,
    pub education_stage: EducationStage,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudySession {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub subject: Subject,
    pub duration_minutes: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub avg_attention: Option<f64>,
    pub avg_emotion_score: Option<f64>,
}

impl StudySession {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn is_scored(&self) -> bool {
        self.avg_attention.is_some()
    }
}

/// Checks externally supplied session results, e.g. an imported row.
pub fn validate_session_result(
    duration_minutes: i32,
    avg_attention: Option<f64>,
    avg_emotion_score: Option<f64>,
) -> Result<(), DomainError> {
    if duration_minutes < 0 {
        return Err(DomainError::NegativeDuration(duration_minutes));
    }

    match (avg_attention, avg_emotion_score) {
        (None, None) => Ok(()),
        (Some(attention), Some(emotion)) => {
            if !(1.0..=3.0).contains(&attention) {
                return Err(DomainError::InvalidAverageAttention(attention));
            }
            if !(0.0..=1.0).contains(&emotion) {
                return Err(DomainError::InvalidEmotionScore(emotion));
            }
            Ok(())
        }
        _ => Err(DomainError::PartialScore),
    }
}

/// One observation as handed over by the classifier, before it is stored.
#[derive(Debug, Clone)]
pub struct SampleInput {
    pub emotion: String,
    pub attention_level: i32,
    pub confidence: f64,
}

impl SampleInput {
    /// Normalises the label to its canonical spelling and checks ranges.
    pub fn validate(self) -> Result<SampleInput, DomainError> {
        let emotion = EMOTION_LABELS
            .iter()
            .find(|label| label.eq_ignore_ascii_case(self.emotion.trim()))
            .ok_or_else(|| DomainError::UnknownEmotion(self.emotion.clone()))?;

        if !(1..=3).contains(&self.attention_level) {
            return Err(DomainError::InvalidAttention(self.attention_level));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DomainError::InvalidConfidence(self.confidence));
        }

        Ok(SampleInput {
            emotion: emotion.to_string(),
            ..self
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Sample {
    pub id: Uuid,
    pub session_id: Uuid,
    pub recorded_at: DateTime<Utc>,
    pub emotion: String,
    pub attention_level: i32,
    pub confidence: f64,
}
