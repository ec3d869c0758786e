//! Pool configuration.
//!
//! Connection parameters plus the refresh and retry policy.  Built from
//! environment variables with [`PoolConfig::from_env`] or programmatically
//! with [`PoolConfig::new`] and the `with_*` builders.

use std::time::Duration;

use dynpool_broker::parse_duration;

use crate::error::PoolError;

/// Validation query run on every checked-out connection.
pub const DEFAULT_VALIDATION_QUERY: &str = "SELECT 1";

/// Connection parameters and lifecycle policy of a [`CredentialPool`](crate::CredentialPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Maximum live connections per generation.
    pub max_size: usize,
    /// Connections opened eagerly when a generation is built.
    pub min_idle: usize,
    /// Validity window of a dynamic credential.
    pub ttl: Duration,
    /// How long before `ttl` a proactive refresh happens.
    pub refresh_margin: Duration,
    /// Checkout attempts per `acquire`, including the first.
    pub max_attempts: u32,
    /// Pause between an authentication-class failure and the refresh.
    pub retry_backoff: Duration,
    /// Round-trip query run on every checkout.
    pub validation_query: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: "todos".to_string(),
            max_size: 5,
            min_idle: 0,
            ttl: Duration::from_secs(15),
            refresh_margin: Duration::from_secs(2),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(1),
            validation_query: DEFAULT_VALIDATION_QUERY.to_string(),
        }
    }
}

impl PoolConfig {
    /// Configuration for `database` on `host` with default policy.
    pub fn new(host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            database: database.into(),
            ..Default::default()
        }
    }

    /// Set the database port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the maximum connections per generation.
    #[must_use]
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set the number of connections opened when a generation is built.
    #[must_use]
    pub fn with_min_idle(mut self, count: usize) -> Self {
        self.min_idle = count;
        self
    }

    /// Set the credential TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the proactive refresh margin.
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Set the attempt budget of `acquire`.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the backoff between attempts.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Set the validation query.
    #[must_use]
    pub fn with_validation_query(mut self, query: impl Into<String>) -> Self {
        self.validation_query = query.into();
        self
    }

    /// Age at which a credential counts as stale.
    pub fn refresh_after(&self) -> Duration {
        self.ttl.saturating_sub(self.refresh_margin)
    }

    /// Reject configurations the pool cannot honour.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_size == 0 {
            return Err(PoolError::Config("pool size must be at least 1".into()));
        }
        if self.min_idle > self.max_size {
            return Err(PoolError::Config(format!(
                "min idle ({}) exceeds pool size ({})",
                self.min_idle, self.max_size
            )));
        }
        if self.max_attempts == 0 {
            return Err(PoolError::Config("max attempts must be at least 1".into()));
        }
        if self.refresh_margin >= self.ttl {
            return Err(PoolError::Config(format!(
                "refresh margin ({:?}) must be shorter than the credential TTL ({:?})",
                self.refresh_margin, self.ttl
            )));
        }
        Ok(())
    }

    /// Build the configuration from environment variables.
    ///
    /// | Variable             | Default     |
    /// |----------------------|-------------|
    /// | `DB_HOST`            | `localhost` |
    /// | `DB_PORT`            | `3306`      |
    /// | `DB_NAME`            | `todos`     |
    /// | `DB_POOL_SIZE`       | `5`         |
    /// | `DB_MIN_IDLE`        | `0`         |
    /// | `DYNAMIC_SECRET_TTL` | `15s`       |
    /// | `REFRESH_MARGIN`     | `2s`        |
    /// | `DB_MAX_ATTEMPTS`    | `3`         |
    /// | `DB_RETRY_BACKOFF`   | `1s`        |
    pub fn from_env() -> Result<Self, PoolError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PoolError> {
        let mut config = Self::default();

        if let Some(host) = lookup("DB_HOST") {
            config.host = host;
        }
        if let Some(database) = lookup("DB_NAME") {
            config.database = database;
        }
        if let Some(raw) = lookup("DB_PORT") {
            config.port = parse_number("DB_PORT", &raw)?;
        }
        if let Some(raw) = lookup("DB_POOL_SIZE") {
            config.max_size = parse_number("DB_POOL_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("DB_MIN_IDLE") {
            config.min_idle = parse_number("DB_MIN_IDLE", &raw)?;
        }
        if let Some(raw) = lookup("DB_MAX_ATTEMPTS") {
            config.max_attempts = parse_number("DB_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(raw) = lookup("DYNAMIC_SECRET_TTL") {
            config.ttl = parse_env_duration("DYNAMIC_SECRET_TTL", &raw)?;
        }
        if let Some(raw) = lookup("REFRESH_MARGIN") {
            config.refresh_margin = parse_env_duration("REFRESH_MARGIN", &raw)?;
        }
        if let Some(raw) = lookup("DB_RETRY_BACKOFF") {
            config.retry_backoff = parse_env_duration("DB_RETRY_BACKOFF", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, PoolError> {
    raw.trim()
        .parse()
        .map_err(|_| PoolError::Config(format!("{key}: invalid number {raw:?}")))
}

fn parse_env_duration(key: &str, raw: &str) -> Result<Duration, PoolError> {
    parse_duration(raw).ok_or_else(|| PoolError::Config(format!("{key}: invalid duration {raw:?}")))
}
