use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, Timelike};
use serde::Serialize;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{StudySession, Subject, NEUTRAL_COLOR};

pub const DEFAULT_TREND_WINDOW: usize = 10;
const MIN_SCORED_FOR_IMPROVEMENT: usize = 5;
const IMPROVEMENT_EDGE: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectStats {
    pub count: usize,
    pub total_minutes: i64,
    /// `None` when none of the subject's sessions were scored.
    pub avg_attention_pct: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date_label: String,
    pub attention_pct: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "rate", rename_all = "snake_case")]
pub enum ImprovementRate {
    Rate(i64),
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_sessions: usize,
    pub total_minutes: i64,
    pub total_hours: f64,
    pub avg_attention_pct: i64,
    pub avg_session_minutes: f64,
    pub best_subject: Option<Subject>,
    pub best_hour: Option<u32>,
    pub improvement: ImprovementRate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEntry {
    pub id: Uuid,
    pub subject: String,
    pub duration_minutes: i32,
    pub avg_attention: Option<f64>,
    pub start: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub best_subject: Option<Subject>,
    pub color: &'static str,
    pub sessions: Vec<CalendarEntry>,
}

/// Maps the 1-3 attention scale onto 0-100. Halves round away from zero.
pub fn attention_pct(avg_attention: f64) -> i64 {
    (avg_attention * 100.0 / 3.0).round() as i64
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sessions that have ended. An open session still carries its planned
/// duration and no score, so every aggregate skips it.
fn finalized(sessions: &[StudySession]) -> impl Iterator<Item = &StudySession> {
    sessions.iter().filter(|s| !s.is_active())
}

fn chronological(sessions: &[StudySession]) -> Vec<&StudySession> {
    let mut ordered: Vec<&StudySession> = finalized(sessions).collect();
    ordered.sort_by_key(|s| s.start_time);
    ordered
}

/// Highest-mean key; on exact ties the smallest key wins.
fn argmax<K: Ord + Clone>(means: &BTreeMap<K, f64>) -> Option<K> {
    let mut best: Option<(&K, f64)> = None;
    for (key, value) in means {
        match best {
            Some((_, current)) if *value <= current => {}
            _ => best = Some((key, *value)),
        }
    }
    best.map(|(key, _)| key.clone())
}

pub fn per_subject_stats(sessions: &[StudySession]) -> BTreeMap<Subject, SubjectStats> {
    let mut totals: BTreeMap<Subject, (usize, i64, Vec<f64>)> = BTreeMap::new();

    for session in finalized(sessions) {
        let entry = totals
            .entry(session.subject.clone())
            .or_insert((0, 0, Vec::new()));
        entry.0 += 1;
        entry.1 += session.duration_minutes as i64;
        if let Some(attention) = session.avg_attention {
            entry.2.push(attention);
        }
    }

    totals
        .into_iter()
        .map(|(subject, (count, total_minutes, scores))| {
            let stats = SubjectStats {
                count,
                total_minutes,
                avg_attention_pct: mean(&scores).map(attention_pct),
            };
            (subject, stats)
        })
        .collect()
}

/// Mean attention per subject over scored sessions only.
pub fn subject_means(sessions: &[StudySession]) -> BTreeMap<Subject, f64> {
    let mut scores: BTreeMap<Subject, Vec<f64>> = BTreeMap::new();
    for session in finalized(sessions) {
        if let Some(attention) = session.avg_attention {
            scores.entry(session.subject.clone()).or_default().push(attention);
        }
    }

    scores
        .into_iter()
        .filter_map(|(subject, values)| mean(&values).map(|m| (subject, m)))
        .collect()
}

/// Mean attention across every scored session.
pub fn overall_attention(sessions: &[StudySession]) -> Option<f64> {
    let scores: Vec<f64> = finalized(sessions).filter_map(|s| s.avg_attention).collect();
    mean(&scores)
}

/// The last `window` sessions by start time; unscored sessions plot as 0.
pub fn attention_trend(sessions: &[StudySession], window: usize) -> Vec<TrendPoint> {
    let ordered = chronological(sessions);
    let skip = ordered.len().saturating_sub(window);

    ordered
        .into_iter()
        .skip(skip)
        .map(|session| TrendPoint {
            date_label: session.start_time.format("%m/%d").to_string(),
            attention_pct: session.avg_attention.map(attention_pct).unwrap_or(0),
        })
        .collect()
}

/// Relative change between the first three and last three scored sessions.
pub fn improvement_rate(sessions: &[StudySession]) -> ImprovementRate {
    let scored: Vec<f64> = chronological(sessions)
        .into_iter()
        .filter_map(|s| s.avg_attention)
        .collect();

    if scored.len() < MIN_SCORED_FOR_IMPROVEMENT {
        return ImprovementRate::InsufficientData;
    }

    let early = mean(&scored[..IMPROVEMENT_EDGE]).unwrap_or(0.0);
    let recent = mean(&scored[scored.len() - IMPROVEMENT_EDGE..]).unwrap_or(0.0);
    if early == 0.0 {
        return ImprovementRate::InsufficientData;
    }

    ImprovementRate::Rate(((recent - early) / early * 100.0).round() as i64)
}

pub fn best_subject(sessions: &[StudySession]) -> Option<Subject> {
    argmax(&subject_means(sessions))
}

/// Start hour (0-23) whose scored sessions have the highest mean attention.
pub fn best_time_of_day(sessions: &[StudySession]) -> Option<u32> {
    let mut scores: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for session in finalized(sessions) {
        if let Some(attention) = session.avg_attention {
            scores
                .entry(session.start_time.hour())
                .or_default()
                .push(attention);
        }
    }

    let means: BTreeMap<u32, f64> = scores
        .into_iter()
        .filter_map(|(hour, values)| mean(&values).map(|m| (hour, m)))
        .collect();
    argmax(&means)
}

/// Subject of the single best-scoring session on `date`. The earliest
/// session wins a tie.
pub fn best_subject_for_day(sessions: &[StudySession], date: NaiveDate) -> Option<Subject> {
    let day: Vec<&StudySession> = chronological(sessions)
        .into_iter()
        .filter(|s| s.start_time.date_naive() == date)
        .collect();
    best_session_subject(&day)
}

/// Subject of the highest-scoring session; expects start-time order and
/// keeps the first of equal scores.
fn best_session_subject(sessions: &[&StudySession]) -> Option<Subject> {
    let mut best: Option<(&StudySession, f64)> = None;

    for session in sessions.iter().copied() {
        let Some(attention) = session.avg_attention else {
            continue;
        };
        match best {
            Some((_, current)) if attention <= current => {}
            _ => best = Some((session, attention)),
        }
    }

    best.map(|(session, _)| session.subject.clone())
}

pub fn performance_summary(sessions: &[StudySession]) -> PerformanceSummary {
    let total_sessions = finalized(sessions).count();
    let total_minutes: i64 = finalized(sessions).map(|s| s.duration_minutes as i64).sum();

    PerformanceSummary {
        total_sessions,
        total_minutes,
        total_hours: total_minutes as f64 / 60.0,
        avg_attention_pct: overall_attention(sessions).map(attention_pct).unwrap_or(0),
        avg_session_minutes: if total_sessions == 0 {
            0.0
        } else {
            total_minutes as f64 / total_sessions as f64
        },
        best_subject: best_subject(sessions),
        best_hour: best_time_of_day(sessions),
        improvement: improvement_rate(sessions),
    }
}

/// Day-by-day view of one month: each day's winning subject and its sessions.
pub fn calendar_month(
    sessions: &[StudySession],
    year: i32,
    month: u32,
) -> Result<BTreeMap<NaiveDate, CalendarDay>, DomainError> {
    NaiveDate::from_ymd_opt(year, month, 1).ok_or(DomainError::InvalidMonth { year, month })?;

    let mut days: BTreeMap<NaiveDate, Vec<&StudySession>> = BTreeMap::new();
    for session in chronological(sessions) {
        let date = session.start_time.date_naive();
        if date.year() == year && date.month() == month {
            days.entry(date).or_default().push(session);
        }
    }

    let calendar = days
        .into_iter()
        .map(|(date, day_sessions)| {
            let best_subject = best_session_subject(&day_sessions);
            let color = best_subject.as_ref().map(Subject::color).unwrap_or(NEUTRAL_COLOR);
            let entries = day_sessions
                .iter()
                .map(|s| CalendarEntry {
                    id: s.id,
                    subject: s.subject.display_name().to_string(),
                    duration_minutes: s.duration_minutes,
                    avg_attention: s.avg_attention,
                    start: s.start_time.format("%H:%M").to_string(),
                })
                .collect();

            (
                date,
                CalendarDay {
                    best_subject,
                    color,
                    sessions: entries,
                },
            )
        })
        .collect();

    Ok(calendar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn session(subject: Subject, start: DateTime<Utc>, minutes: i32, attention: Option<f64>) -> StudySession {
        StudySession {
            id: Uuid::new_v4(),
            learner_id: Uuid::nil(),
            subject,
            duration_minutes: minutes,
            start_time: start,
            end_time: Some(start + chrono::Duration::minutes(minutes as i64)),
            avg_attention: attention,
            avg_emotion_score: attention.map(|_| 0.7),
        }
    }

    #[test]
    fn per_subject_counts_unscored_sessions_but_skips_them_in_average() {
        let sessions = vec![
            session(Subject::Math, at(1, 16), 30, Some(3.0)),
            session(Subject::Math, at(2, 16), 20, None),
            session(Subject::Math, at(3, 16), 25, Some(2.0)),
            session(Subject::Art, at(3, 18), 15, None),
        ];

        let stats = per_subject_stats(&sessions);
        let math = &stats[&Subject::Math];
        assert_eq!(math.count, 3);
        assert_eq!(math.total_minutes, 75);
        assert_eq!(math.avg_attention_pct, Some(83));

        let art = &stats[&Subject::Art];
        assert_eq!(art.count, 1);
        assert_eq!(art.avg_attention_pct, None);
    }

    #[test]
    fn unknown_subject_codes_group_under_their_raw_code() {
        let sessions = vec![session(
            Subject::from_code("robotics"),
            at(1, 10),
            40,
            Some(2.0),
        )];
        let stats = per_subject_stats(&sessions);
        let (subject, row) = stats.iter().next().unwrap();
        assert_eq!(subject.display_name(), "robotics");
        assert_eq!(row.total_minutes, 40);
    }

    #[test]
    fn trend_keeps_latest_window_in_order_with_zero_for_unscored() {
        let mut sessions: Vec<StudySession> = (1..=12)
            .map(|day| session(Subject::Math, at(day, 9), 30, Some(3.0)))
            .collect();
        sessions[11].avg_attention = None;
        sessions.reverse();

        let trend = attention_trend(&sessions, DEFAULT_TREND_WINDOW);
        assert_eq!(trend.len(), 10);
        assert_eq!(trend[0].date_label, "03/03");
        assert_eq!(trend[0].attention_pct, 100);
        assert_eq!(trend[9].date_label, "03/12");
        assert_eq!(trend[9].attention_pct, 0);
    }

    #[test]
    fn improvement_needs_five_scored_sessions() {
        let sessions: Vec<StudySession> = (1..=4)
            .map(|day| session(Subject::Math, at(day, 9), 30, Some(2.0)))
            .chain(std::iter::once(session(Subject::Math, at(5, 9), 30, None)))
            .collect();
        assert_eq!(improvement_rate(&sessions), ImprovementRate::InsufficientData);
    }

    #[test]
    fn improvement_compares_first_and_last_three_scored() {
        let scores = [2.0, 2.0, 2.0, 3.5, 3.5];
        let sessions: Vec<StudySession> = scores
            .iter()
            .enumerate()
            .map(|(i, score)| session(Subject::Math, at(i as u32 + 1, 9), 30, Some(*score)))
            .collect();
        assert_eq!(improvement_rate(&sessions), ImprovementRate::Rate(50));
    }

    #[test]
    fn improvement_guards_zero_baseline() {
        let scores = [0.0, 0.0, 0.0, 2.0, 3.0];
        let sessions: Vec<StudySession> = scores
            .iter()
            .enumerate()
            .map(|(i, score)| session(Subject::Math, at(i as u32 + 1, 9), 30, Some(*score)))
            .collect();
        assert_eq!(improvement_rate(&sessions), ImprovementRate::InsufficientData);
    }

    #[test]
    fn best_subject_uses_subject_means_and_catalogue_order_on_ties() {
        let sessions = vec![
            session(Subject::Science, at(1, 9), 30, Some(2.5)),
            session(Subject::Math, at(2, 9), 30, Some(3.0)),
            session(Subject::Math, at(3, 9), 30, Some(2.0)),
            session(Subject::Art, at(4, 9), 30, None),
        ];
        assert_eq!(best_subject(&sessions), Some(Subject::Math));

        let tied = vec![
            session(Subject::Cs, at(1, 9), 30, Some(2.0)),
            session(Subject::Science, at(2, 9), 30, Some(2.0)),
        ];
        assert_eq!(best_subject(&tied), Some(Subject::Science));
    }

    #[test]
    fn best_time_of_day_picks_highest_hour_mean() {
        let sessions = vec![
            session(Subject::Math, at(1, 7), 30, Some(2.9)),
            session(Subject::Math, at(2, 19), 30, Some(1.2)),
            session(Subject::Math, at(3, 19), 30, Some(3.0)),
            session(Subject::Math, at(4, 21), 30, None),
        ];
        assert_eq!(best_time_of_day(&sessions), Some(7));
        assert_eq!(best_time_of_day(&[]), None);
    }

    #[test]
    fn best_subject_for_day_uses_single_best_session() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        let sessions = vec![
            session(Subject::Math, at(4, 9), 30, Some(1.8)),
            session(Subject::Science, at(4, 15), 30, Some(2.6)),
            session(Subject::Art, at(5, 9), 30, Some(3.0)),
        ];
        assert_eq!(best_subject_for_day(&sessions, date), Some(Subject::Science));

        // Session max, not subject mean: math averages 2.2 here but science wins.
        let mixed = vec![
            session(Subject::Math, at(4, 9), 30, Some(2.5)),
            session(Subject::Math, at(4, 10), 30, Some(1.9)),
            session(Subject::Science, at(4, 11), 30, Some(2.6)),
            session(Subject::Science, at(4, 12), 30, Some(1.0)),
        ];
        assert_eq!(best_subject_for_day(&mixed, date), Some(Subject::Science));

        let empty_day = NaiveDate::from_ymd_opt(2026, 3, 20).unwrap();
        assert_eq!(best_subject_for_day(&sessions, empty_day), None);
    }

    #[test]
    fn empty_history_yields_zero_values() {
        assert!(per_subject_stats(&[]).is_empty());
        assert!(attention_trend(&[], DEFAULT_TREND_WINDOW).is_empty());
        assert_eq!(improvement_rate(&[]), ImprovementRate::InsufficientData);
        assert_eq!(best_subject(&[]), None);

        let summary = performance_summary(&[]);
        assert_eq!(summary.total_sessions, 0);
        assert_eq!(summary.total_minutes, 0);
        assert_eq!(summary.avg_attention_pct, 0);
        assert_eq!(summary.avg_session_minutes, 0.0);
    }

    #[test]
    fn calendar_groups_by_day_and_colours_winner() {
        let sessions = vec![
            session(Subject::Math, at(4, 9), 30, Some(1.8)),
            session(Subject::Science, at(4, 15), 45, Some(2.6)),
            session(Subject::Art, at(6, 9), 20, None),
            session(
                Subject::Math,
                Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap(),
                30,
                Some(3.0),
            ),
        ];

        let calendar = calendar_month(&sessions, 2026, 3).unwrap();
        assert_eq!(calendar.len(), 2);

        let fourth = &calendar[&NaiveDate::from_ymd_opt(2026, 3, 4).unwrap()];
        assert_eq!(fourth.best_subject, Some(Subject::Science));
        assert_eq!(fourth.color, "#2ECC71");
        assert_eq!(fourth.sessions.len(), 2);
        assert_eq!(fourth.sessions[1].start, "15:00");

        let sixth = &calendar[&NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()];
        assert_eq!(sixth.best_subject, None);
        assert_eq!(sixth.color, NEUTRAL_COLOR);

        assert_eq!(
            calendar_month(&sessions, 2026, 13),
            Err(DomainError::InvalidMonth { year: 2026, month: 13 })
        );
    }

    #[test]
    fn open_session_is_left_out_of_every_aggregate() {
        let done = session(Subject::Math, at(1, 9), 20, Some(3.0));
        let mut open = session(Subject::Math, at(2, 9), 30, None);
        open.end_time = None;

        let only_done = vec![done.clone()];
        let with_open = vec![done, open];

        let summary = performance_summary(&with_open);
        assert_eq!(summary.total_sessions, 1);
        assert_eq!(summary.total_minutes, 20);
        assert_eq!(summary, performance_summary(&only_done));

        let trend: Vec<i64> = attention_trend(&with_open, DEFAULT_TREND_WINDOW)
            .iter()
            .map(|p| p.attention_pct)
            .collect();
        assert_eq!(trend, vec![100]);
        assert_eq!(per_subject_stats(&with_open)[&Subject::Math].count, 1);
        assert_eq!(calendar_month(&with_open, 2026, 3).unwrap().len(), 1);
    }

    #[test]
    fn repeated_calls_return_identical_results() {
        let sessions = vec![
            session(Subject::Math, at(1, 9), 30, Some(1.8)),
            session(Subject::Science, at(2, 15), 45, Some(2.6)),
        ];
        assert_eq!(performance_summary(&sessions), performance_summary(&sessions));
        assert_eq!(per_subject_stats(&sessions), per_subject_stats(&sessions));
    }

    proptest! {
        #[test]
        fn total_minutes_ignore_scoring_status(
            rows in prop::collection::vec((0usize..3, 1i32..120, prop::option::of(1.0f64..=3.0)), 0..60)
        ) {
            let subjects = [Subject::Math, Subject::Science, Subject::Art];
            let sessions: Vec<StudySession> = rows
                .iter()
                .enumerate()
                .map(|(i, (s, minutes, attention))| {
                    session(subjects[*s].clone(), at(1 + (i % 28) as u32, 9), *minutes, *attention)
                })
                .collect();

            let stats = per_subject_stats(&sessions);
            for subject in subjects.iter() {
                let expected: i64 = sessions
                    .iter()
                    .filter(|s| &s.subject == subject)
                    .map(|s| s.duration_minutes as i64)
                    .sum();
                let actual = stats.get(subject).map(|row| row.total_minutes).unwrap_or(0);
                prop_assert_eq!(actual, expected);
            }
        }
    }
}
