//! Runtime configuration loaded from the environment

use std::env;
use std::time::Duration;

use crate::error::TrackerError;
use crate::Result;

/// Origins the dashboard is served from during development.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:8080",
    "http://localhost:8081",
    "http://127.0.0.1:8080",
    "http://localhost:5173",
    "http://127.0.0.1:5173",
];

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_TOKEN_TTL: &str = "7d";
/// Longest accepted token lifetime (100 years).
pub const MAX_TOKEN_TTL_SECS: u64 = 100 * 365 * 86_400;
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub allowed_origins: Vec<String>,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub google_client_id: String,
}

impl Config {
    /// Read configuration from the process environment.
    ///
    /// Call `dotenv::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match non_empty("PORT").or_else(|| non_empty("API_PORT")) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|_| TrackerError::Config(format!("invalid port: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        let jwt_secret = non_empty("JWT_SECRET")
            .ok_or_else(|| TrackerError::Config("JWT_SECRET must be set".to_string()))?;

        let token_ttl = parse_ttl(
            &non_empty("JWT_EXPIRES_IN").unwrap_or_else(|| DEFAULT_TOKEN_TTL.to_string()),
        )?;

        let mut allowed_origins: Vec<String> = DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(|origin| origin.to_string())
            .collect();
        if let Some(origin) = non_empty("CLIENT_ORIGIN") {
            let origin = origin.trim().trim_end_matches('/').to_string();
            if !allowed_origins.contains(&origin) {
                allowed_origins.push(origin);
            }
        }

        Ok(Self {
            port,
            database_url: non_empty("DATABASE_URL").or_else(|| non_empty("POSTGRES_URL")),
            jwt_secret,
            token_ttl,
            allowed_origins,
            openai_api_key: non_empty("OPENAI_API_KEY").unwrap_or_default(),
            openai_model: non_empty("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: non_empty("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_MODEL_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            google_client_id: non_empty("GOOGLE_CLIENT_ID").unwrap_or_default(),
        })
    }
}

/// Parse a token lifetime such as `7d`, `12h`, `30m`, `45s` or `3600`.
pub fn parse_ttl(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let invalid = || TrackerError::Config(format!("invalid token lifetime: {}", raw));

    let (digits, unit_secs) = match raw.chars().last() {
        Some('d') => (&raw[..raw.len() - 1], 86_400),
        Some('h') => (&raw[..raw.len() - 1], 3_600),
        Some('m') => (&raw[..raw.len() - 1], 60),
        Some('s') => (&raw[..raw.len() - 1], 1),
        Some(c) if c.is_ascii_digit() => (raw, 1),
        _ => return Err(invalid()),
    };

    let count: u64 = digits.trim().parse().map_err(|_| invalid())?;
    if count == 0 {
        return Err(invalid());
    }

    let secs = count
        .checked_mul(unit_secs)
        .filter(|secs| *secs <= MAX_TOKEN_TTL_SECS)
        .ok_or_else(invalid)?;

    Ok(Duration::from_secs(secs))
}
