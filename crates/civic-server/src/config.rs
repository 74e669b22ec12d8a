use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use civic_card::CardFormat;
use civic_db::DbOptions;
use url::Url;

/// Session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub db: DbOptions,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    pub public_url: Url,
    pub light_template: Option<PathBuf>,
    pub dark_template: Option<PathBuf>,
    pub card_format: CardFormat,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let session_secret = get("CIVIC_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("CIVIC_SESSION_SECRET is unset or still a placeholder");
        }

        let host = var("CIVIC_HOST", "0.0.0.0");
        let port: u16 = var("CIVIC_PORT", "3000").parse().context("CIVIC_PORT")?;
        let ip: IpAddr = host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .with_context(|| format!("CIVIC_HOST '{host}' is not an IP address"))?;
        let addr = SocketAddr::new(ip, port);

        let public_url = Url::parse(&var("CIVIC_PUBLIC_URL", "http://localhost:3000"))
            .context("CIVIC_PUBLIC_URL")?;
        if !matches!(public_url.scheme(), "http" | "https") {
            bail!("CIVIC_PUBLIC_URL must be an http(s) URL");
        }

        let busy_timeout_secs: u64 = var("CIVIC_BUSY_TIMEOUT_SECS", "30")
            .parse()
            .context("CIVIC_BUSY_TIMEOUT_SECS")?;
        let alloc_attempts: u32 = var("CIVIC_ALLOC_RETRIES", "3")
            .parse()
            .context("CIVIC_ALLOC_RETRIES")?;
        let session_ttl_hours: i64 = var("CIVIC_SESSION_TTL_HOURS", "24")
            .parse()
            .context("CIVIC_SESSION_TTL_HOURS")?;
        if session_ttl_hours <= 0 {
            bail!("CIVIC_SESSION_TTL_HOURS must be positive");
        }
        let max_upload_mb: usize = var("CIVIC_MAX_UPLOAD_MB", "10")
            .parse()
            .context("CIVIC_MAX_UPLOAD_MB")?;

        let card_format: CardFormat = var("CIVIC_CARD_FORMAT", "jpeg")
            .parse()
            .map_err(anyhow::Error::msg)?;

        Ok(Self {
            addr,
            db_path: var("CIVIC_DB_PATH", "civic.db").into(),
            db: DbOptions {
                busy_timeout: Duration::from_secs(busy_timeout_secs),
                alloc_attempts,
            },
            session_secret,
            session_ttl_hours,
            public_url,
            light_template: get("CIVIC_CARD_LIGHT_TEMPLATE").map(PathBuf::from),
            dark_template: get("CIVIC_CARD_DARK_TEMPLATE").map(PathBuf::from),
            card_format,
            max_upload_bytes: max_upload_mb * 1024 * 1024,
        })
    }
}
