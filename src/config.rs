//! Server and client configuration

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

pub const DEFAULT_MAX_ACTIVE_GUARDIANS: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to
    pub bind_address: SocketAddr,

    /// Postgres connection string; the in-memory store is used without one
    pub database_url: Option<String>,

    /// Prefix of the URL encoded into pickup QR codes
    pub pickup_base_url: String,

    /// Active guardians allowed per student
    pub max_active_guardians: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 3000)),
            database_url: None,
            pickup_base_url: "https://pickup.localhost/p".to_string(),
            max_active_guardians: DEFAULT_MAX_ACTIVE_GUARDIANS,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            bind_address: parsed("PICKUP_BIND_ADDRESS")?.unwrap_or(defaults.bind_address),
            database_url: non_empty("DATABASE_URL"),
            pickup_base_url: non_empty("PICKUP_BASE_URL").unwrap_or(defaults.pickup_base_url),
            max_active_guardians: parsed("PICKUP_MAX_ACTIVE_GUARDIANS")?
                .unwrap_or(defaults.max_active_guardians),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,

    /// Upper bound for every call to the credential service
    pub request_timeout: Duration,

    /// How long login waits for the push token before going without it
    pub push_token_timeout: Duration,
}

impl ClientConfig {
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(10),
            push_token_timeout: Duration::from_secs(3),
        }
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    non_empty(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("invalid value for {}: `{}`", key, raw))
        })
        .transpose()
}
