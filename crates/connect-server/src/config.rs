use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Used when `RUST_LOG` is unset. Names every workspace crate.
pub const DEFAULT_LOG_FILTER: &str =
    "startup_connect=debug,connect_api=debug,connect_gateway=debug,connect_db=debug,tower_http=debug";

const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "secret", "changeme"];

/// Runtime settings, read from `CONNECT_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub otp_ttl: chrono::Duration,
    pub io_timeout: Duration,
    pub mail: Option<MailRelay>,
}

#[derive(Debug, Clone)]
pub struct MailRelay {
    pub url: String,
    pub api_key: Option<String>,
    pub from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = var("CONNECT_JWT_SECRET").context("CONNECT_JWT_SECRET must be set")?;
        if PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("CONNECT_JWT_SECRET is a placeholder value, set a real secret");
        }

        let db_path = PathBuf::from(var("CONNECT_DB_PATH").unwrap_or_else(|| "startup-connect.db".into()));
        let host = var("CONNECT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = parse_or(var("CONNECT_PORT"), "CONNECT_PORT", 3000)?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let otp_ttl_secs: i64 = parse_or(var("CONNECT_OTP_TTL_SECS"), "CONNECT_OTP_TTL_SECS", 300)?;
        if otp_ttl_secs <= 0 {
            bail!("CONNECT_OTP_TTL_SECS must be positive");
        }
        let io_timeout_secs: u64 = parse_or(var("CONNECT_IO_TIMEOUT_SECS"), "CONNECT_IO_TIMEOUT_SECS", 10)?;

        let mail = match var("CONNECT_MAIL_RELAY_URL") {
            Some(url) => Some(MailRelay {
                url,
                api_key: var("CONNECT_MAIL_API_KEY"),
                from: var("CONNECT_MAIL_FROM").unwrap_or_else(|| "no-reply@startup-connect.local".into()),
            }),
            None => None,
        };

        Ok(Self {
            jwt_secret,
            db_path,
            addr,
            otp_ttl: chrono::Duration::seconds(otp_ttl_secs),
            io_timeout: Duration::from_secs(io_timeout_secs),
            mail,
        })
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(v) => v.parse().with_context(|| format!("{} is not valid: '{}'", key, v)),
        None => Ok(default),
    }
}
