//! Service configuration from environment variables
//!
//! Every setting has a default, so an empty environment yields a working
//! local setup. Enumerated settings reject unknown values instead of silently
//! falling back.

use crate::metrics::{FunnelBaseline, ReportConfig, SeriesBucket};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Connection pool, timeout and retry settings for the SQLite store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Maximum number of pooled connections
    pub pool_size: usize,

    /// How long a request may wait for a free connection
    pub acquire_timeout: Duration,

    /// Upper bound on a single query (append or snapshot)
    pub query_timeout: Duration,

    /// Retries on transient failures, after the first attempt
    pub max_retries: u32,

    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
}

impl StoreConfig {
    pub fn new(db_path: impl Into<String>) -> Self {
        Self {
            db_path: db_path.into(),
            pool_size: 8,
            acquire_timeout: Duration::from_millis(2_000),
            query_timeout: Duration::from_millis(5_000),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_millis(1_000),
        }
    }
}

/// Top-level configuration for the analytics server.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub store: StoreConfig,
    pub report: ReportConfig,

    /// Shared secret for the dashboard; `None` leaves it open
    pub dashboard_token: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `ANALYTICS_DB_PATH` (default: data/analytics.db)
    /// - `ANALYTICS_BIND_ADDR` (default: 127.0.0.1:3000)
    /// - `STORE_POOL_SIZE` (default: 8)
    /// - `STORE_ACQUIRE_TIMEOUT_MS` (default: 2000)
    /// - `STORE_QUERY_TIMEOUT_MS` (default: 5000)
    /// - `STORE_MAX_RETRIES` (default: 3)
    /// - `STORE_RETRY_BASE_MS` (default: 50)
    /// - `STORE_RETRY_MAX_MS` (default: 1000)
    /// - `DASHBOARD_TOKEN` (default: unset)
    /// - `FUNNEL_BASELINE` (default: start_step; or page_views)
    /// - `FUNNEL_START_STEP` (default: view_form)
    /// - `FORM_START_STEP` (default: view_form)
    /// - `SERIES_BUCKET` (default: day; or week)
    /// - `SERIES_LIMIT` (default: 7, 0 = no cap)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bind_addr = match var("ANALYTICS_BIND_ADDR") {
            Some(raw) => raw.parse::<SocketAddr>().map_err(|e| {
                ConfigError::InvalidValue(format!("ANALYTICS_BIND_ADDR '{}': {}", raw, e))
            })?,
            None => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };

        let mut store = StoreConfig::new(
            var("ANALYTICS_DB_PATH").unwrap_or_else(|| "data/analytics.db".to_string()),
        );
        store.pool_size = parse_number(&var, "STORE_POOL_SIZE", store.pool_size)?;
        if store.pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "STORE_POOL_SIZE must be at least 1".to_string(),
            ));
        }
        store.acquire_timeout = Duration::from_millis(parse_number(
            &var,
            "STORE_ACQUIRE_TIMEOUT_MS",
            store.acquire_timeout.as_millis() as u64,
        )?);
        store.query_timeout = Duration::from_millis(parse_number(
            &var,
            "STORE_QUERY_TIMEOUT_MS",
            store.query_timeout.as_millis() as u64,
        )?);
        store.max_retries = parse_number(&var, "STORE_MAX_RETRIES", store.max_retries)?;
        store.retry_base_delay = Duration::from_millis(parse_number(
            &var,
            "STORE_RETRY_BASE_MS",
            store.retry_base_delay.as_millis() as u64,
        )?);
        store.retry_max_delay = Duration::from_millis(parse_number(
            &var,
            "STORE_RETRY_MAX_MS",
            store.retry_max_delay.as_millis() as u64,
        )?);

        let mut report = ReportConfig::default();
        if let Some(step) = var("FUNNEL_START_STEP") {
            report.funnel_start_step = step;
        }
        if let Some(step) = var("FORM_START_STEP") {
            report.form_start_step = step;
        }
        if let Some(raw) = var("FUNNEL_BASELINE") {
            report.funnel_baseline = FunnelBaseline::from_str(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "FUNNEL_BASELINE must be 'page_views' or 'start_step', got '{}'",
                    raw
                ))
            })?;
        }
        if let Some(raw) = var("SERIES_BUCKET") {
            report.series_bucket = SeriesBucket::from_str(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!(
                    "SERIES_BUCKET must be 'day' or 'week', got '{}'",
                    raw
                ))
            })?;
        }
        let limit: usize = parse_number(&var, "SERIES_LIMIT", report.series_limit.unwrap_or(0))?;
        report.series_limit = (limit > 0).then_some(limit);

        Ok(Self {
            bind_addr,
            store,
            report,
            dashboard_token: var("DASHBOARD_TOKEN"),
        })
    }
}

fn parse_number<T, F>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(format!("{} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
