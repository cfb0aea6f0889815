use std::net::IpAddr;
use std::num::NonZeroU32;
use std::time::Duration;

use crate::import::{DEFAULT_CONCURRENCY, ImportSettings};
use crate::worker::PoolSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub db_max_connections: u32,
    pub worker: WorkerConfig,
    pub import: ImportConfig,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub batch_size: usize,
    pub poll_interval: Duration,
    /// Simulated delivery latency of the log transport.
    pub send_latency: Duration,
    /// Upper bound on a single delivery attempt.
    pub send_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub concurrency: usize,
    pub rate_per_second: NonZeroU32,
    pub burst: NonZeroU32,
}

impl WorkerConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            worker_count: self.worker_count,
            batch_size: self.batch_size,
            poll_interval: self.poll_interval,
        }
    }
}

impl ImportConfig {
    pub fn settings(&self) -> ImportSettings {
        ImportSettings {
            concurrency: self.concurrency,
            rate_per_second: self.rate_per_second,
            burst: self.burst,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let env = Env { lookup };

        let database_url = env.required("DATABASE_URL")?;
        let host: IpAddr = env.parse_or("TASKNOTIFY_HOST", "0.0.0.0")?;
        let port: u16 = env.parse_or("TASKNOTIFY_PORT", "3000")?;
        let log_level = env.or("TASKNOTIFY_LOG_LEVEL", "info");
        let db_max_connections: u32 = env.parse_or("TASKNOTIFY_DB_MAX_CONNECTIONS", "10")?;

        let worker = WorkerConfig {
            worker_count: env.positive("TASKNOTIFY_WORKER_COUNT", "2")?,
            batch_size: env.positive("TASKNOTIFY_BATCH_SIZE", "10")?,
            poll_interval: Duration::from_millis(
                env.parse_or("TASKNOTIFY_POLL_INTERVAL_MS", "1000")?,
            ),
            send_latency: Duration::from_millis(env.parse_or("TASKNOTIFY_SEND_LATENCY_MS", "50")?),
            send_timeout: Duration::from_millis(
                env.positive("TASKNOTIFY_SEND_TIMEOUT_MS", "10000")? as u64,
            ),
        };

        // Non-positive concurrency means "use the default", matching the import engine.
        let concurrency = match env.parse_or::<i64>("TASKNOTIFY_IMPORT_CONCURRENCY", "10")? {
            n if n <= 0 => DEFAULT_CONCURRENCY,
            n => n as usize,
        };
        let rate_per_second: NonZeroU32 = env.parse_or("TASKNOTIFY_IMPORT_RATE", "100")?;
        let burst: NonZeroU32 = env.parse_or("TASKNOTIFY_IMPORT_BURST", &concurrency.to_string())?;

        Ok(Config {
            database_url,
            host,
            port,
            log_level,
            db_max_connections,
            worker,
            import: ImportConfig {
                concurrency,
                rate_per_second,
                burst,
            },
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn required(&self, key: &str) -> Result<String, String> {
        (self.lookup)(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("Missing required environment variable: {key}"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: &str) -> Result<T, String>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or(key, default)
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {key}: {e}"))
    }

    fn positive(&self, key: &str, default: &str) -> Result<usize, String> {
        match self.parse_or::<usize>(key, default)? {
            0 => Err(format!("Invalid {key}: must be greater than zero")),
            n => Ok(n),
        }
    }
}
