use std::fmt::Write;

use chrono::NaiveDate;

use crate::emotion;
use crate::models::{Learner, Sample, StudySession};
use crate::stats::{self, ImprovementRate};
use crate::suggest::{self, Category};

fn pct_or_na(value: Option<i64>) -> String {
    value.map(|v| format!("{v}%")).unwrap_or_else(|| "n/a".to_string())
}

pub fn build_report(learner: &Learner, sessions: &[StudySession], generated_on: NaiveDate) -> String {
    let summary = stats::performance_summary(sessions);
    let subjects = stats::per_subject_stats(sessions);
    let trend = stats::attention_trend(sessions, stats::DEFAULT_TREND_WINDOW);
    let suggestions = suggest::generate_suggestions(learner, sessions);

    let mut output = String::new();

    let _ = writeln!(output, "# Learning Assessment Report");
    let _ = writeln!(output);
    let _ = writeln!(output, "| Field | Value |");
    let _ = writeln!(output, "| --- | --- |");
    let _ = writeln!(output, "| Learner | {} |", learner.nickname);
    let _ = writeln!(output, "| Gender | {} |", learner.gender.as_str());
    let _ = writeln!(output, "| Age | {} |", learner.age);
    let _ = writeln!(output, "| Education Stage | {} |", learner.education_stage.label());
    let _ = writeln!(output, "| Report Date | {} |", generated_on);
    let _ = writeln!(output, "| Total Sessions | {} |", summary.total_sessions);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Data Analysis");

    if sessions.is_empty() {
        let _ = writeln!(output, "No study sessions recorded yet.");
    } else {
        let _ = writeln!(
            output,
            "- Total study time: {:.1} hours ({} minutes)",
            summary.total_hours, summary.total_minutes
        );
        let _ = writeln!(output, "- Average attention: {}%", summary.avg_attention_pct);
        let _ = writeln!(output, "- Study frequency: {} sessions", summary.total_sessions);
        let _ = writeln!(
            output,
            "- Average session length: {:.1} minutes",
            summary.avg_session_minutes
        );
        if let Some(subject) = &summary.best_subject {
            let _ = writeln!(output, "- Best subject: {}", subject.display_name());
        }
        if let Some(hour) = summary.best_hour {
            let _ = writeln!(output, "- Most focused start hour: {hour:02}:00");
        }
        match summary.improvement {
            ImprovementRate::Rate(rate) => {
                let _ = writeln!(output, "- Improvement rate: {rate:+}%");
            }
            ImprovementRate::InsufficientData => {
                let _ = writeln!(output, "- Improvement rate: not enough scored sessions yet");
            }
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "## Subject Performance");
        let _ = writeln!(output, "| Subject | Sessions | Total Time | Avg Attention |");
        let _ = writeln!(output, "| --- | --- | --- | --- |");
        for (subject, row) in subjects.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} min | {} |",
                subject.display_name(),
                row.count,
                row.total_minutes,
                pct_or_na(row.avg_attention_pct)
            );
        }

        let _ = writeln!(output);
        let _ = writeln!(output, "## Attention Trend");
        for point in trend.iter() {
            let _ = writeln!(output, "- {}: {}%", point.date_label, point.attention_pct);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Personalized Recommendations");

    for category in Category::ALL {
        let items = match suggestions.get(&category) {
            Some(items) if !items.is_empty() => items,
            _ => continue,
        };
        let _ = writeln!(output);
        let _ = writeln!(output, "### {}", category.title());
        for item in items {
            let _ = writeln!(output, "- {item}");
        }
    }

    output
}

/// Snapshot of a single session: timing, scores and the emotion mix.
pub fn build_session_report(session: &StudySession, samples: &[Sample]) -> String {
    let mix = emotion::emotion_mix(samples);
    let mut output = String::new();

    let _ = writeln!(output, "# Study Session Report");
    let _ = writeln!(output);
    let _ = writeln!(output, "- Subject: {}", session.subject.display_name());
    let _ = writeln!(
        output,
        "- Started: {}",
        session.start_time.format("%Y-%m-%d %H:%M:%S")
    );
    match session.end_time {
        Some(ended) => {
            let _ = writeln!(output, "- Ended: {}", ended.format("%Y-%m-%d %H:%M:%S"));
        }
        None => {
            let _ = writeln!(output, "- Ended: still active");
        }
    }
    let _ = writeln!(output, "- Duration: {} minutes", session.duration_minutes);
    let _ = writeln!(
        output,
        "- Attention: {}",
        pct_or_na(session.avg_attention.map(stats::attention_pct))
    );
    match session.avg_emotion_score {
        Some(score) => {
            let _ = writeln!(output, "- Mean confidence: {score:.3}");
        }
        None => {
            let _ = writeln!(output, "- Mean confidence: n/a");
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Emotion Mix");

    if mix.total == 0 {
        let _ = writeln!(output, "No samples recorded for this session.");
    } else {
        let _ = writeln!(output, "Dominant emotion: {}", mix.dominant.unwrap_or("-"));
        for share in mix.shares.iter() {
            let _ = writeln!(
                output,
                "- {:<10}: {:.3} ({} samples)",
                share.label, share.share, share.count
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Interest Advice");
    let _ = writeln!(output, "{}", mix.advice());

    output
}
