use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DomainError;
use crate::models::{Sample, StudySession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Open and accepting samples. A session is active from the moment it is
    /// created.
    Active,
    /// Ended; scoring fields are frozen.
    Finalized,
}

impl SessionState {
    pub fn of(session: &StudySession) -> SessionState {
        if session.is_active() {
            SessionState::Active
        } else {
            SessionState::Finalized
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SessionScore {
    pub avg_attention: Option<f64>,
    pub avg_emotion_score: Option<f64>,
}

/// Mean attention level and mean classifier confidence over a session's
/// samples. An empty session stays unscored.
pub fn score_samples(samples: &[Sample]) -> SessionScore {
    if samples.is_empty() {
        return SessionScore::default();
    }

    let count = samples.len() as f64;
    let attention_total: i64 = samples.iter().map(|s| s.attention_level as i64).sum();
    let confidence_total: f64 = samples.iter().map(|s| s.confidence).sum();

    SessionScore {
        avg_attention: Some(attention_total as f64 / count),
        avg_emotion_score: Some(confidence_total / count),
    }
}

pub fn ensure_accepting_samples(session: &StudySession) -> Result<(), DomainError> {
    match SessionState::of(session) {
        SessionState::Active => Ok(()),
        SessionState::Finalized => Err(DomainError::SessionFinalized(session.id)),
    }
}

/// Ends an active session: stamps `end_time`, replaces the planned duration
/// with the whole minutes actually elapsed, and stores the sample averages.
pub fn close_session(
    session: &StudySession,
    samples: &[Sample],
    ended_at: DateTime<Utc>,
) -> Result<StudySession, DomainError> {
    ensure_accepting_samples(session)?;

    let elapsed = (ended_at - session.start_time).num_minutes().max(0);
    let score = score_samples(samples);

    Ok(StudySession {
        end_time: Some(ended_at),
        duration_minutes: i32::try_from(elapsed).unwrap_or(i32::MAX),
        avg_attention: score.avg_attention,
        avg_emotion_score: score.avg_emotion_score,
        ..session.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Subject;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn sample(attention_level: i32, confidence: f64) -> Sample {
        Sample {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            recorded_at: Utc.with_ymd_and_hms(2026, 3, 2, 16, 5, 0).unwrap(),
            emotion: "Neutral".to_string(),
            attention_level,
            confidence,
        }
    }

    fn open_session() -> StudySession {
        StudySession {
            id: Uuid::new_v4(),
            learner_id: Uuid::new_v4(),
            subject: Subject::Math,
            duration_minutes: 30,
            start_time: Utc.with_ymd_and_hms(2026, 3, 2, 16, 0, 0).unwrap(),
            end_time: None,
            avg_attention: None,
            avg_emotion_score: None,
        }
    }

    #[test]
    fn empty_session_stays_unscored() {
        assert_eq!(score_samples(&[]), SessionScore::default());
    }

    #[test]
    fn averages_attention_and_confidence() {
        let score = score_samples(&[sample(1, 0.2), sample(3, 0.6), sample(2, 0.7)]);
        assert_eq!(score.avg_attention, Some(2.0));
        assert!((score.avg_emotion_score.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn closing_uses_elapsed_minutes_and_freezes_scores() {
        let session = open_session();
        let ended_at = session.start_time + Duration::seconds(25 * 60 + 40);
        let closed = close_session(&session, &[sample(3, 0.9)], ended_at).unwrap();

        assert_eq!(closed.end_time, Some(ended_at));
        assert_eq!(closed.duration_minutes, 25);
        assert_eq!(closed.avg_attention, Some(3.0));
        assert_eq!(SessionState::of(&closed), SessionState::Finalized);

        let again = close_session(&closed, &[], ended_at);
        assert_eq!(again.unwrap_err(), DomainError::SessionFinalized(session.id));
    }

    #[test]
    fn finalized_session_rejects_samples() {
        let mut session = open_session();
        assert!(ensure_accepting_samples(&session).is_ok());
        session.end_time = Some(session.start_time);
        assert!(ensure_accepting_samples(&session).is_err());
    }

    proptest! {
        #[test]
        fn averages_stay_within_sample_ranges(
            raw in prop::collection::vec((1i32..=3, 0.0f64..=1.0), 1..200)
        ) {
            let samples: Vec<Sample> = raw.iter().map(|(a, c)| sample(*a, *c)).collect();
            let score = score_samples(&samples);
            let attention = score.avg_attention.unwrap();
            let emotion = score.avg_emotion_score.unwrap();
            prop_assert!((1.0..=3.0).contains(&attention));
            prop_assert!((0.0..=1.0 + 1e-9).contains(&emotion));
        }
    }
}
