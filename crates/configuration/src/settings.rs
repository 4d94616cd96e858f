use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logger: LoggerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Config {
    /// Checks the cross-field rules that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()
    }
}

/// Controls the process-wide tracing subscriber.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// An `EnvFilter` directive such as `info` or `database=debug,info`.
    /// `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Everything needed to build and maintain the PostgreSQL connection pool.
///
/// Integer durations are whole seconds; `Duration` fields accept either a
/// number of seconds or a humantime string (`"30s"`, `"15m"`, `"1h 30m"`).
/// A zero value means "use the driver's default" unless noted otherwise.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    /// Kept as a string so that a malformed value is reported as a database
    /// configuration error at connect time. Blank means 5432.
    pub port: String,
    pub user: String,
    pub password: String,
    /// Identifies this application to the server (`application_name`).
    pub application_name: String,
    /// The name of the database to target.
    pub name: String,
    /// A libpq SSL mode. Anything other than `disable` requires the TLS files below.
    pub ssl_mode: String,

    /// Maximum number of connections in the pool.
    pub connection_pool_max: u32,
    /// Minimum number of connections in the pool.
    pub connection_pool_min: u32,
    /// How many times a failed checkout is retried before giving up.
    pub connection_retries: u32,
    /// Seconds to wait between attempts to establish the pool.
    pub connection_retry_wait_time: u64,
    /// Upper bound on attempts to establish the pool. 0 retries forever.
    pub connect_max_attempts: u32,

    /// Logs every statement at debug level.
    pub enable_db_logging: bool,
    /// Seconds to wait for a new connection before timing out.
    pub dial_timeout: u64,
    /// Seconds between TCP keep-alive probes.
    pub connection_keep_alive: u64,

    /// How long a connection may sit idle before it is closed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub connection_max_idle_time: Duration,
    /// How long after creation a connection is closed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub connection_max_lifetime: Duration,
    /// Window past `connection_max_lifetime` within which a connection is
    /// closed at a random point, so connections do not all expire together.
    #[serde(deserialize_with = "deserialize_duration")]
    pub connection_max_lifetime_jitter: Duration,

    pub security_string: SecurityString,

    /// Path to the root CA file.
    pub tls_ca: Option<PathBuf>,
    /// Path to the client certificate.
    pub tls_certificate: Option<PathBuf>,
    /// Path to the client certificate's private key.
    pub tls_key: Option<PathBuf>,

    /// Label attached to pool metrics.
    pub subsystem: String,

    /// Upper bound on waiting for background workers during shutdown.
    #[serde(deserialize_with = "deserialize_duration")]
    pub shutdown_timeout: Duration,
    /// How often pool statistics are reported.
    #[serde(deserialize_with = "deserialize_duration")]
    pub stats_interval: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: String::new(),
            user: String::new(),
            password: String::new(),
            application_name: String::new(),
            name: String::new(),
            ssl_mode: "disable".to_string(),
            connection_pool_max: 0,
            connection_pool_min: 0,
            connection_retries: 0,
            connection_retry_wait_time: 0,
            connect_max_attempts: 0,
            enable_db_logging: false,
            dial_timeout: 0,
            connection_keep_alive: 0,
            connection_max_idle_time: Duration::ZERO,
            connection_max_lifetime: Duration::ZERO,
            connection_max_lifetime_jitter: Duration::ZERO,
            security_string: SecurityString::default(),
            tls_ca: None,
            tls_certificate: None,
            tls_key: None,
            subsystem: "database".to_string(),
            shutdown_timeout: Duration::from_secs(10),
            stats_interval: Duration::from_secs(60),
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database.host must not be blank".to_string(),
            ));
        }
        if self.connection_pool_max > 0 && self.connection_pool_min > self.connection_pool_max {
            return Err(ConfigError::ValidationError(format!(
                "database.connection_pool_min ({}) exceeds database.connection_pool_max ({})",
                self.connection_pool_min, self.connection_pool_max
            )));
        }
        Ok(())
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.connection_retry_wait_time)
    }

    pub fn dial_timeout(&self) -> Option<Duration> {
        (self.dial_timeout > 0).then(|| Duration::from_secs(self.dial_timeout))
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        (self.connection_keep_alive > 0).then(|| Duration::from_secs(self.connection_keep_alive))
    }

    /// `true` when TLS is explicitly turned off.
    pub fn ssl_disabled(&self) -> bool {
        self.ssl_mode.eq_ignore_ascii_case("disable")
    }
}

/// Length of the application security token, in bytes.
pub const SECURITY_STRING_LEN: usize = 32;

/// A fixed-width opaque token identifying this application to its peers.
///
/// Deserialised from a string of exactly 32 bytes. Never printed.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct SecurityString([u8; SECURITY_STRING_LEN]);

impl SecurityString {
    pub fn new(bytes: [u8; SECURITY_STRING_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SECURITY_STRING_LEN] {
        &self.0
    }

    /// `true` unless the token is all zeroes (i.e. never configured).
    pub fn is_set(&self) -> bool {
        self.0.iter().any(|b| *b != 0)
    }
}

impl TryFrom<&str> for SecurityString {
    type Error = ConfigError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let bytes: [u8; SECURITY_STRING_LEN] = value.as_bytes().try_into().map_err(|_| {
            ConfigError::ValidationError(format!(
                "security string must be exactly {SECURITY_STRING_LEN} bytes, got {}",
                value.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for SecurityString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecurityString(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for SecurityString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SecurityString::try_from(raw.as_str()).map_err(de::Error::custom)
    }
}

/// Accepts whole seconds or a humantime string.
fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a number of seconds or a duration such as \"30s\"")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
            u64::try_from(v)
                .map(Duration::from_secs)
                .map_err(|_| E::custom(format!("duration must not be negative, got {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
            let v = v.trim();
            if v.is_empty() {
                return Ok(Duration::ZERO);
            }
            if let Ok(secs) = v.parse::<u64>() {
                return Ok(Duration::from_secs(secs));
            }
            humantime::parse_duration(v).map_err(|e| E::custom(format!("invalid duration '{v}': {e}")))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}
