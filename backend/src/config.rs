use anyhow::{anyhow, Context};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::{env, net::SocketAddr, str::FromStr};

const DEFAULT_MAX_HISTORY: usize = 1000;
const DEFAULT_SESSION_LIFETIME_HOURS: i64 = 24;
const DEFAULT_SWEEP_INTERVAL_MINUTES: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" | "inmemory" => Ok(StoreBackend::Memory),
            "postgres" | "postgresql" | "pg" => Ok(StoreBackend::Postgres),
            other => Err(anyhow!("Invalid STORE_BACKEND value: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub public_base_url: Option<String>,
    pub admin_key: String,
    pub max_history: usize,
    /// `None` means sessions never expire.
    pub session_lifetime_hours: Option<i64>,
    pub sweep_interval_minutes: u64,
    pub lazy_expiry: bool,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_connect_timeout_seconds: u64,
    pub database_max_connections: u32,
    pub cors_allow_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8888)),
            public_base_url: None,
            admin_key: "changeme".to_string(),
            max_history: DEFAULT_MAX_HISTORY,
            session_lifetime_hours: Some(DEFAULT_SESSION_LIFETIME_HOURS),
            sweep_interval_minutes: DEFAULT_SWEEP_INTERVAL_MINUTES,
            lazy_expiry: true,
            store_backend: StoreBackend::Memory,
            database_url: None,
            database_connect_timeout_seconds: 5,
            database_max_connections: 10,
            cors_allow_origins: vec!["*".to_string()],
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("Invalid BIND_ADDR value: {}", raw))?,
            None => defaults.bind_addr,
        };

        let public_base_url = lookup("PUBLIC_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());

        let admin_key = lookup("ADMIN_KEY").unwrap_or(defaults.admin_key);

        let max_history: usize = parse_or("MAX_HISTORY", &lookup, defaults.max_history)?;
        if max_history == 0 {
            return Err(anyhow!("MAX_HISTORY must be at least 1"));
        }

        let session_lifetime_hours = match lookup("MAX_SESSION_LIFETIME_HOURS") {
            Some(raw) => parse_lifetime_hours(&raw)?,
            None => defaults.session_lifetime_hours,
        };

        let sweep_interval_minutes = parse_or(
            "SESSION_SWEEP_INTERVAL_MINUTES",
            &lookup,
            defaults.sweep_interval_minutes,
        )?;

        let lazy_expiry = match lookup("LAZY_EXPIRY") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow!("Invalid LAZY_EXPIRY value: {}", raw))?,
            None => defaults.lazy_expiry,
        };

        let store_backend = match lookup("STORE_BACKEND") {
            Some(raw) => raw.parse()?,
            None => defaults.store_backend,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL is required when STORE_BACKEND=postgres"));
        }

        let database_connect_timeout_seconds = parse_or(
            "DATABASE_CONNECT_TIMEOUT_SECONDS",
            &lookup,
            defaults.database_connect_timeout_seconds,
        )?;
        let database_max_connections = parse_or(
            "DATABASE_MAX_CONNECTIONS",
            &lookup,
            defaults.database_max_connections,
        )?;

        let cors_allow_origins = lookup("CORS_ALLOW_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().trim_end_matches('/').to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or(defaults.cors_allow_origins);

        Ok(Config {
            bind_addr,
            public_base_url,
            admin_key,
            max_history,
            session_lifetime_hours,
            sweep_interval_minutes,
            lazy_expiry,
            store_backend,
            database_url,
            database_connect_timeout_seconds,
            database_max_connections,
            cors_allow_origins,
        })
    }

    pub fn session_lifetime(&self) -> Option<Duration> {
        self.session_lifetime_hours.map(Duration::hours)
    }

    pub fn sweep_interval(&self) -> Option<std::time::Duration> {
        if self.sweep_interval_minutes == 0 {
            return None;
        }
        Some(std::time::Duration::from_secs(
            self.sweep_interval_minutes * 60,
        ))
    }
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("Invalid {} value: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_lifetime_hours(raw: &str) -> anyhow::Result<Option<i64>> {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "" | "none" | "unbounded" | "infinite" | "never" => return Ok(None),
        _ => {}
    }
    let hours: i64 = value
        .parse()
        .map_err(|_| anyhow!("Invalid MAX_SESSION_LIFETIME_HOURS value: {}", raw))?;
    match hours {
        0 => Ok(None),
        h if h < 0 => Err(anyhow!(
            "MAX_SESSION_LIFETIME_HOURS must not be negative: {}",
            raw
        )),
        h => Ok(Some(h)),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
