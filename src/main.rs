use std::path::PathBuf;

use anyhow::Context;
use chrono::{Datelike, Utc};
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

mod config;
mod db;
mod emotion;
mod error;
mod logging;
mod models;
mod report;
mod session;
mod stats;
mod suggest;

use models::{LearnerProfile, SampleInput, Subject};
use stats::ImprovementRate;

#[derive(Parser)]
#[command(name = "study-insights")]
#[command(about = "Study session tracking, attention statistics and learning suggestions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProfileArgs {
    #[arg(long)]
    nickname: String,
    /// male or female
    #[arg(long)]
    gender: String,
    #[arg(long)]
    age: i32,
    /// elementary, middle or high
    #[arg(long)]
    stage: String,
}

impl ProfileArgs {
    fn into_profile(self) -> anyhow::Result<LearnerProfile> {
        Ok(LearnerProfile {
            nickname: self.nickname,
            gender: self.gender.parse()?,
            age: self.age,
            education_stage: self.stage.parse()?,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo learners and sessions
    Seed,
    /// Import finished sessions from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Add a learner profile to an account
    AddLearner {
        #[arg(long)]
        account: String,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// Edit a learner profile
    UpdateLearner {
        #[arg(long)]
        learner: Uuid,
        #[command(flatten)]
        profile: ProfileArgs,
    },
    /// List the learners of an account
    Learners {
        #[arg(long)]
        account: String,
    },
    /// Delete a learner and all of their sessions
    RemoveLearner {
        #[arg(long)]
        learner: Uuid,
    },
    /// Start a study session
    Start {
        #[arg(long)]
        learner: Uuid,
        #[arg(long)]
        subject: String,
        #[arg(long, default_value_t = 30)]
        minutes: i32,
    },
    /// Record one emotion/attention sample for an active session
    Record {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        emotion: String,
        #[arg(long)]
        attention: i32,
        #[arg(long)]
        confidence: f64,
    },
    /// Finalize a session and score it
    End {
        #[arg(long)]
        session: Uuid,
    },
    /// Delete a single session
    DeleteSession {
        #[arg(long)]
        session: Uuid,
    },
    /// Delete every session of a learner
    ResetHistory {
        #[arg(long)]
        learner: Uuid,
    },
    /// Show learner statistics
    Stats {
        #[arg(long)]
        learner: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Show the best subject per day for one month
    Calendar {
        #[arg(long)]
        learner: Uuid,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
    /// Show personalized suggestions
    Suggest {
        #[arg(long)]
        learner: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown learning report
    Report {
        #[arg(long)]
        learner: Uuid,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Generate a markdown report for one session
    SessionReport {
        #[arg(long)]
        session: Uuid,
        #[arg(long, default_value = "session_report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::Config::from_env()?;
    logging::init_tracing(&config.log_level);

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} sessions from {}.", csv.display());
        }
        Commands::AddLearner { account, profile } => {
            let learner = db::create_learner(&pool, &account, &profile.into_profile()?).await?;
            println!("Created learner {} ({}).", learner.nickname, learner.id);
        }
        Commands::UpdateLearner { learner, profile } => {
            let learner = db::update_learner(&pool, learner, &profile.into_profile()?).await?;
            println!("Updated learner {} ({}).", learner.nickname, learner.id);
        }
        Commands::Learners { account } => {
            let learners = db::list_learners(&pool, &account).await?;
            if learners.is_empty() {
                println!("No learners for {account}.");
                return Ok(());
            }
            for learner in learners.iter() {
                println!(
                    "- {} ({}) {} age {}, {}",
                    learner.nickname,
                    learner.id,
                    learner.gender.as_str(),
                    learner.age,
                    learner.education_stage.label()
                );
            }
        }
        Commands::RemoveLearner { learner } => {
            if db::delete_learner(&pool, learner).await? {
                println!("Learner {learner} deleted.");
            } else {
                println!("Learner {learner} not found.");
            }
        }
        Commands::Start {
            learner,
            subject,
            minutes,
        } => {
            let subject = Subject::known(&subject)?;
            let session = db::start_session(&pool, learner, subject, minutes).await?;
            println!(
                "Started {} session {} ({} minutes planned).",
                session.subject.display_name(),
                session.id,
                session.duration_minutes
            );
        }
        Commands::Record {
            session,
            emotion,
            attention,
            confidence,
        } => {
            let input = SampleInput {
                emotion,
                attention_level: attention,
                confidence,
            };
            let sample = db::record_sample(&pool, session, input).await?;
            println!(
                "Recorded {} (attention {}) at {}.",
                sample.emotion,
                sample.attention_level,
                sample.recorded_at.format("%H:%M:%S")
            );
        }
        Commands::End { session } => {
            let closed = db::end_session(&pool, session).await?;
            match closed.avg_attention {
                Some(attention) => println!(
                    "Session {} finalized: {} minutes, attention {}%.",
                    closed.id,
                    closed.duration_minutes,
                    stats::attention_pct(attention)
                ),
                None => println!(
                    "Session {} finalized: {} minutes, not enough data to score.",
                    closed.id, closed.duration_minutes
                ),
            }
        }
        Commands::DeleteSession { session } => {
            if db::delete_session(&pool, session).await? {
                println!("Session {session} deleted.");
            } else {
                println!("Session {session} not found.");
            }
        }
        Commands::ResetHistory { learner } => {
            let removed = db::reset_history(&pool, learner).await?;
            println!("Removed {removed} sessions.");
        }
        Commands::Stats { learner, json } => {
            let sessions = db::fetch_sessions(&pool, learner).await?;
            let summary = stats::performance_summary(&sessions);
            let subjects = stats::per_subject_stats(&sessions);
            let trend = stats::attention_trend(&sessions, stats::DEFAULT_TREND_WINDOW);

            if json {
                let payload = serde_json::json!({
                    "summary": summary,
                    "subjects": subjects,
                    "trend": trend,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
                return Ok(());
            }

            if sessions.is_empty() {
                println!("No study sessions recorded yet.");
                return Ok(());
            }

            println!(
                "{} sessions, {:.1} hours, average attention {}%.",
                summary.total_sessions, summary.total_hours, summary.avg_attention_pct
            );
            if let Some(subject) = &summary.best_subject {
                println!("Best subject: {}", subject.display_name());
            }
            if let Some(hour) = summary.best_hour {
                println!("Most focused start hour: {hour:02}:00");
            }
            match summary.improvement {
                ImprovementRate::Rate(rate) => println!("Improvement rate: {rate:+}%"),
                ImprovementRate::InsufficientData => {
                    println!("Improvement rate: not enough scored sessions yet")
                }
            }
            println!("By subject:");
            for (subject, row) in subjects.iter() {
                let attention = row
                    .avg_attention_pct
                    .map(|pct| format!("{pct}%"))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "- {}: {} sessions, {} minutes, attention {}",
                    subject.display_name(),
                    row.count,
                    row.total_minutes,
                    attention
                );
            }
        }
        Commands::Calendar {
            learner,
            year,
            month,
        } => {
            let today = Utc::now().date_naive();
            let year = year.unwrap_or(today.year());
            let month = month.unwrap_or(today.month());
            let sessions = db::fetch_sessions(&pool, learner).await?;
            let calendar = stats::calendar_month(&sessions, year, month)?;

            if calendar.is_empty() {
                println!("No sessions in {year}-{month:02}.");
                return Ok(());
            }
            for (date, day) in calendar.iter() {
                let best = day
                    .best_subject
                    .as_ref()
                    .map(|s| s.display_name().to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!("{date}: best {best} [{}], {} sessions", day.color, day.sessions.len());
                for entry in day.sessions.iter() {
                    println!(
                        "    {} {} ({} min)",
                        entry.start, entry.subject, entry.duration_minutes
                    );
                }
            }
        }
        Commands::Suggest { learner, json } => {
            let profile = db::fetch_learner(&pool, learner).await?;
            let sessions = db::fetch_sessions(&pool, learner).await?;
            let suggestions = suggest::generate_suggestions(&profile, &sessions);

            if json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
                return Ok(());
            }

            for (category, items) in suggestions.iter() {
                if items.is_empty() {
                    continue;
                }
                println!("{}:", category.title());
                for item in items.iter() {
                    println!("- {item}");
                }
            }
        }
        Commands::Report { learner, out } => {
            let profile = db::fetch_learner(&pool, learner).await?;
            let sessions = db::fetch_sessions(&pool, learner).await?;
            let report = report::build_report(&profile, &sessions, Utc::now().date_naive());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(learner_id = %learner, path = %out.display(), "report written");
            println!("Report written to {}.", out.display());
        }
        Commands::SessionReport { session, out } => {
            let study_session = db::fetch_session(&pool, session).await?;
            let samples = db::fetch_samples(&pool, session).await?;
            let report = report::build_session_report(&study_session, &samples);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            info!(session_id = %session, path = %out.display(), "session report written");
            println!("Session report written to {}.", out.display());
        }
    }

    Ok(())
}
