use anyhow::Context;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::error::DomainError;
use crate::models::{
    validate_session_result, EducationStage, Gender, Learner, LearnerProfile, Sample, SampleInput,
    StudySession, Subject, MAX_LEARNERS_PER_ACCOUNT,
};
use crate::session;

const LEARNER_COLUMNS: &str =
    "l.id, l.account_id, l.nickname, l.gender, l.age, l.education_stage, l.created_at";
const SESSION_COLUMNS: &str = "id, learner_id, subject, duration_minutes, start_time, end_time, \
     avg_attention, avg_emotion_score";
const SAMPLE_COLUMNS: &str = "id, session_id, recorded_at, emotion, attention_level, confidence";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn row_to_learner(row: &PgRow) -> anyhow::Result<Learner> {
    let gender: String = row.try_get("gender")?;
    let stage: String = row.try_get("education_stage")?;

    Ok(Learner {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        nickname: row.try_get("nickname")?,
        gender: gender.parse::<Gender>()?,
        age: row.try_get("age")?,
        education_stage: stage.parse::<EducationStage>()?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_session(row: &PgRow) -> anyhow::Result<StudySession> {
    let subject: String = row.try_get("subject")?;

    Ok(StudySession {
        id: row.try_get("id")?,
        learner_id: row.try_get("learner_id")?,
        subject: Subject::from_code(&subject),
        duration_minutes: row.try_get("duration_minutes")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        avg_attention: row.try_get("avg_attention")?,
        avg_emotion_score: row.try_get("avg_emotion_score")?,
    })
}

fn row_to_sample(row: &PgRow) -> anyhow::Result<Sample> {
    Ok(Sample {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        recorded_at: row.try_get("recorded_at")?,
        emotion: row.try_get("emotion")?,
        attention_level: row.try_get("attention_level")?,
        confidence: row.try_get("confidence")?,
    })
}

async fn ensure_account(conn: &mut PgConnection, email: &str) -> anyhow::Result<Uuid> {
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO study_insights.accounts (id, email)
        VALUES ($1, $2)
        ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .fetch_one(&mut *conn)
    .await?
    .get("id");

    Ok(id)
}

async fn find_learner_id(
    conn: &mut PgConnection,
    account_id: Uuid,
    nickname: &str,
) -> anyhow::Result<Option<Uuid>> {
    let row = sqlx::query(
        "SELECT id FROM study_insights.learners WHERE account_id = $1 AND nickname = $2",
    )
    .bind(account_id)
    .bind(nickname)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(|r| r.get("id")))
}

/// Inserts a learner after checking the per-account cap. The account row is
/// locked so concurrent inserts for one account cannot both pass the check.
async fn insert_learner(
    conn: &mut PgConnection,
    account_id: Uuid,
    profile: &LearnerProfile,
) -> anyhow::Result<Uuid> {
    sqlx::query("SELECT id FROM study_insights.accounts WHERE id = $1 FOR UPDATE")
        .bind(account_id)
        .fetch_one(&mut *conn)
        .await?;

    let existing: i64 =
        sqlx::query("SELECT COUNT(*) AS total FROM study_insights.learners WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(&mut *conn)
            .await?
            .get("total");

    if existing >= MAX_LEARNERS_PER_ACCOUNT {
        return Err(DomainError::LearnerLimitReached(MAX_LEARNERS_PER_ACCOUNT).into());
    }

    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO study_insights.learners
        (id, account_id, nickname, gender, age, education_stage)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(id)
    .bind(account_id)
    .bind(&profile.nickname)
    .bind(profile.gender.as_str())
    .bind(profile.age)
    .bind(profile.education_stage.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(id)
}

pub async fn create_learner(
    pool: &PgPool,
    account_email: &str,
    profile: &LearnerProfile,
) -> anyhow::Result<Learner> {
    profile.validate()?;

    let mut tx = pool.begin().await?;
    let account_id = ensure_account(&mut tx, account_email).await?;

    if find_learner_id(&mut tx, account_id, &profile.nickname)
        .await?
        .is_some()
    {
        anyhow::bail!(
            "a learner named '{}' already exists for {account_email}",
            profile.nickname
        );
    }

    let id = insert_learner(&mut tx, account_id, profile).await?;
    tx.commit().await?;

    info!(learner_id = %id, account = account_email, "learner created");
    fetch_learner(pool, id).await
}

pub async fn update_learner(
    pool: &PgPool,
    learner_id: Uuid,
    profile: &LearnerProfile,
) -> anyhow::Result<Learner> {
    profile.validate()?;

    let result = sqlx::query(
        r#"
        UPDATE study_insights.learners
        SET nickname = $2, gender = $3, age = $4, education_stage = $5
        WHERE id = $1
        "#,
    )
    .bind(learner_id)
    .bind(&profile.nickname)
    .bind(profile.gender.as_str())
    .bind(profile.age)
    .bind(profile.education_stage.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        anyhow::bail!("learner {learner_id} not found");
    }

    fetch_learner(pool, learner_id).await
}

pub async fn fetch_learner(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<Learner> {
    let query = format!("SELECT {LEARNER_COLUMNS} FROM study_insights.learners l WHERE l.id = $1");
    let row = sqlx::query(&query)
        .bind(learner_id)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("learner {learner_id} not found"))?;

    row_to_learner(&row)
}

pub async fn list_learners(pool: &PgPool, account_email: &str) -> anyhow::Result<Vec<Learner>> {
    let query = format!(
        "SELECT {LEARNER_COLUMNS} FROM study_insights.learners l \
         JOIN study_insights.accounts a ON a.id = l.account_id \
         WHERE a.email = $1 ORDER BY l.created_at"
    );
    let rows = sqlx::query(&query).bind(account_email).fetch_all(pool).await?;

    rows.iter().map(row_to_learner).collect()
}

/// Removes a learner with all sessions and samples in one transaction.
pub async fn delete_learner(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<bool> {
    let mut tx = pool.begin().await?;
    delete_history(&mut tx, learner_id).await?;

    let result = sqlx::query("DELETE FROM study_insights.learners WHERE id = $1")
        .bind(learner_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(result.rows_affected() > 0)
}

async fn delete_history(conn: &mut PgConnection, learner_id: Uuid) -> anyhow::Result<u64> {
    sqlx::query(
        r#"
        DELETE FROM study_insights.samples
        WHERE session_id IN (
            SELECT id FROM study_insights.study_sessions WHERE learner_id = $1
        )
        "#,
    )
    .bind(learner_id)
    .execute(&mut *conn)
    .await?;

    let result = sqlx::query("DELETE FROM study_insights.study_sessions WHERE learner_id = $1")
        .bind(learner_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn reset_history(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;
    let removed = delete_history(&mut tx, learner_id).await?;
    tx.commit().await?;

    info!(learner_id = %learner_id, removed, "learning history reset");
    Ok(removed)
}

pub async fn start_session(
    pool: &PgPool,
    learner_id: Uuid,
    subject: Subject,
    planned_minutes: i32,
) -> anyhow::Result<StudySession> {
    if planned_minutes <= 0 {
        return Err(DomainError::InvalidDuration(planned_minutes).into());
    }

    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM study_insights.learners WHERE id = $1 FOR UPDATE")
        .bind(learner_id)
        .fetch_optional(&mut *tx)
        .await?
        .with_context(|| format!("learner {learner_id} not found"))?;

    let active = sqlx::query(
        "SELECT id FROM study_insights.study_sessions WHERE learner_id = $1 AND end_time IS NULL",
    )
    .bind(learner_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = active {
        return Err(DomainError::SessionAlreadyActive(row.get("id")).into());
    }

    let query = format!(
        "INSERT INTO study_insights.study_sessions \
         (id, learner_id, subject, duration_minutes, start_time) \
         VALUES ($1, $2, $3, $4, $5) RETURNING {SESSION_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(subject.code())
        .bind(planned_minutes)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    let session = row_to_session(&row)?;
    info!(
        session_id = %session.id,
        learner_id = %learner_id,
        subject = session.subject.code(),
        "study session started"
    );
    Ok(session)
}

async fn lock_session(conn: &mut PgConnection, session_id: Uuid) -> anyhow::Result<StudySession> {
    let query = format!(
        "SELECT {SESSION_COLUMNS} FROM study_insights.study_sessions WHERE id = $1 FOR UPDATE"
    );
    let row = sqlx::query(&query)
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await?
        .with_context(|| format!("session {session_id} not found"))?;

    row_to_session(&row)
}

pub async fn record_sample(
    pool: &PgPool,
    session_id: Uuid,
    input: SampleInput,
) -> anyhow::Result<Sample> {
    let input = input.validate()?;

    let mut tx = pool.begin().await?;
    let current = lock_session(&mut tx, session_id).await?;
    session::ensure_accepting_samples(&current)?;

    let query = format!(
        "INSERT INTO study_insights.samples \
         (id, session_id, recorded_at, emotion, attention_level, confidence) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {SAMPLE_COLUMNS}"
    );
    let row = sqlx::query(&query)
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(Utc::now())
        .bind(&input.emotion)
        .bind(input.attention_level)
        .bind(input.confidence)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    row_to_sample(&row)
}

pub async fn end_session(pool: &PgPool, session_id: Uuid) -> anyhow::Result<StudySession> {
    let mut tx = pool.begin().await?;
    let current = lock_session(&mut tx, session_id).await?;
    let samples = samples_for(&mut tx, session_id).await?;
    let closed = session::close_session(&current, &samples, Utc::now())?;

    sqlx::query(
        r#"
        UPDATE study_insights.study_sessions
        SET end_time = $2, duration_minutes = $3, avg_attention = $4, avg_emotion_score = $5
        WHERE id = $1
        "#,
    )
    .bind(closed.id)
    .bind(closed.end_time)
    .bind(closed.duration_minutes)
    .bind(closed.avg_attention)
    .bind(closed.avg_emotion_score)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(
        session_id = %closed.id,
        samples = samples.len(),
        scored = closed.is_scored(),
        "study session finalized"
    );
    Ok(closed)
}

pub async fn delete_session(pool: &PgPool, session_id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM study_insights.study_sessions WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_session(pool: &PgPool, session_id: Uuid) -> anyhow::Result<StudySession> {
    let query = format!("SELECT {SESSION_COLUMNS} FROM study_insights.study_sessions WHERE id = $1");
    let row = sqlx::query(&query)
        .bind(session_id)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("session {session_id} not found"))?;

    row_to_session(&row)
}

/// All sessions of a learner, oldest first.
pub async fn fetch_sessions(pool: &PgPool, learner_id: Uuid) -> anyhow::Result<Vec<StudySession>> {
    let query = format!(
        "SELECT {SESSION_COLUMNS} FROM study_insights.study_sessions \
         WHERE learner_id = $1 ORDER BY start_time ASC, id ASC"
    );
    let rows = sqlx::query(&query).bind(learner_id).fetch_all(pool).await?;

    rows.iter().map(row_to_session).collect()
}

async fn samples_for(conn: &mut PgConnection, session_id: Uuid) -> anyhow::Result<Vec<Sample>> {
    let query = format!(
        "SELECT {SAMPLE_COLUMNS} FROM study_insights.samples \
         WHERE session_id = $1 ORDER BY recorded_at ASC, id ASC"
    );
    let rows = sqlx::query(&query).bind(session_id).fetch_all(&mut *conn).await?;

    rows.iter().map(row_to_sample).collect()
}

pub async fn fetch_samples(pool: &PgPool, session_id: Uuid) -> anyhow::Result<Vec<Sample>> {
    let mut conn = pool.acquire().await?;
    samples_for(&mut conn, session_id).await
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let learners = vec![
        LearnerProfile {
            nickname: "Mia".to_string(),
            gender: Gender::Female,
            age: 7,
            education_stage: EducationStage::Elementary,
        },
        LearnerProfile {
            nickname: "Leo".to_string(),
            gender: Gender::Male,
            age: 14,
            education_stage: EducationStage::Middle,
        },
    ];

    // (source_key, learner, subject, day in March 2026, start hour, attention readings)
    let sessions: Vec<(&str, &str, Subject, u32, u32, Vec<i32>)> = vec![
        ("seed-001", "Mia", Subject::Math, 2, 16, vec![2, 2, 1, 2]),
        ("seed-002", "Mia", Subject::Art, 2, 18, vec![3, 3, 2, 3]),
        ("seed-003", "Mia", Subject::Science, 4, 16, vec![2, 3, 3, 2]),
        ("seed-004", "Mia", Subject::Math, 6, 8, vec![2, 3, 2, 3]),
        ("seed-005", "Mia", Subject::Language, 9, 16, vec![1, 2, 1, 1]),
        ("seed-006", "Mia", Subject::Math, 11, 8, vec![3, 3, 2, 3]),
        ("seed-007", "Leo", Subject::Cs, 3, 20, vec![3, 3, 3, 2]),
        ("seed-008", "Leo", Subject::Math, 5, 20, vec![1, 2, 1, 2]),
        ("seed-009", "Leo", Subject::Social, 7, 15, vec![2, 2, 2, 3]),
    ];

    let mut tx = pool.begin().await?;
    let account_id = ensure_account(&mut tx, "parent@example.com").await?;

    let mut learner_ids = std::collections::HashMap::new();
    for profile in learners.iter() {
        let id = match find_learner_id(&mut tx, account_id, &profile.nickname).await? {
            Some(id) => id,
            None => insert_learner(&mut tx, account_id, profile).await?,
        };
        learner_ids.insert(profile.nickname.as_str(), id);
    }

    let emotions = ["Happy", "Neutral", "Surprise", "Sad"];
    for (source_key, nickname, subject, day, hour, readings) in sessions {
        let learner_id = *learner_ids
            .get(nickname)
            .with_context(|| format!("seed learner {nickname} missing"))?;
        let start = Utc
            .with_ymd_and_hms(2026, 3, day, hour, 0, 0)
            .single()
            .context("invalid seed timestamp")?;
        let session_id = Uuid::new_v4();

        let samples: Vec<Sample> = readings
            .iter()
            .enumerate()
            .map(|(i, level)| Sample {
                id: Uuid::new_v4(),
                session_id,
                recorded_at: start + Duration::minutes(5 * (i as i64 + 1)),
                emotion: emotions[i % emotions.len()].to_string(),
                attention_level: *level,
                confidence: 0.55 + 0.1 * (*level as f64),
            })
            .collect();
        let score = session::score_samples(&samples);

        let inserted = sqlx::query(
            r#"
            INSERT INTO study_insights.study_sessions
            (id, learner_id, subject, duration_minutes, start_time, end_time,
             avg_attention, avg_emotion_score, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(session_id)
        .bind(learner_id)
        .bind(subject.code())
        .bind(25)
        .bind(start)
        .bind(start + Duration::minutes(25))
        .bind(score.avg_attention)
        .bind(score.avg_emotion_score)
        .bind(source_key)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            continue;
        }

        for sample in samples.iter() {
            sqlx::query(
                r#"
                INSERT INTO study_insights.samples
                (id, session_id, recorded_at, emotion, attention_level, confidence)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(sample.id)
            .bind(sample.session_id)
            .bind(sample.recorded_at)
            .bind(&sample.emotion)
            .bind(sample.attention_level)
            .bind(sample.confidence)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        account_email: String,
        nickname: String,
        gender: String,
        age: i32,
        education_stage: String,
        subject: String,
        duration_minutes: i32,
        start_time: DateTime<Utc>,
        avg_attention: Option<f64>,
        avg_emotion_score: Option<f64>,
        source_key: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut inserted = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", index + 1))?;
        let profile = LearnerProfile {
            nickname: row.nickname.clone(),
            gender: row.gender.parse()?,
            age: row.age,
            education_stage: row.education_stage.parse()?,
        };
        profile.validate()?;
        validate_session_result(row.duration_minutes, row.avg_attention, row.avg_emotion_score)
            .with_context(|| format!("invalid CSV record {}", index + 1))?;

        let mut tx = pool.begin().await?;
        let account_id = ensure_account(&mut tx, &row.account_email).await?;
        let learner_id = match find_learner_id(&mut tx, account_id, &profile.nickname).await? {
            Some(id) => id,
            None => insert_learner(&mut tx, account_id, &profile).await?,
        };

        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));
        let subject = Subject::from_code(&row.subject);

        let result = sqlx::query(
            r#"
            INSERT INTO study_insights.study_sessions
            (id, learner_id, subject, duration_minutes, start_time, end_time,
             avg_attention, avg_emotion_score, source_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(learner_id)
        .bind(subject.code())
        .bind(row.duration_minutes)
        .bind(row.start_time)
        .bind(row.start_time + Duration::minutes(row.duration_minutes as i64))
        .bind(row.avg_attention)
        .bind(row.avg_emotion_score)
        .bind(source_key)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    info!(path = %csv_path.display(), inserted, "sessions imported");
    Ok(inserted)
}
