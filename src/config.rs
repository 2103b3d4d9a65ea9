use anyhow::{bail, Context};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub log_level: String,
}

impl Config {
    /// Reads settings from the environment, after loading `.env` if present.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set to a Postgres instance")?;
        let max_connections = parse_max_connections(std::env::var("DB_MAX_CONNECTIONS").ok())?;
        let log_level =
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            database_url,
            max_connections,
            log_level,
        })
    }
}

fn parse_max_connections(raw: Option<String>) -> anyhow::Result<u32> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_MAX_CONNECTIONS);
    };

    let value: u32 = raw
        .trim()
        .parse()
        .with_context(|| format!("DB_MAX_CONNECTIONS must be an integer, got '{raw}'"))?;
    if value == 0 {
        bail!("DB_MAX_CONNECTIONS must be at least 1");
    }
    Ok(value)
}
