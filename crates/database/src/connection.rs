//! Translates a [`DatabaseConfig`] into `sqlx` connection and pool options.
//!
//! Everything in here is pure and synchronous apart from reading the TLS
//! files. Any error returned from this module is a configuration error: the
//! connect loop treats it as fatal instead of retrying.

use crate::error::DbError;
use configuration::DatabaseConfig;
use sqlx::ConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 5432;

/// Resolves the configured port, falling back to [`DEFAULT_PORT`] when blank.
pub fn determine_port(port: &str) -> Result<u16, DbError> {
    let port = port.trim();
    if port.is_empty() {
        return Ok(DEFAULT_PORT);
    }
    port.parse::<u16>()
        .map_err(|e| DbError::ConnectionConfigError(format!("invalid port '{port}': {e}")))
}

/// Builds the per-connection options: address, credentials, TLS, logging and keep-alive.
pub fn connect_options(cfg: &DatabaseConfig) -> Result<PgConnectOptions, DbError> {
    let mut options = PgConnectOptions::new()
        .host(&cfg.host)
        .port(determine_port(&cfg.port)?);

    if !cfg.user.is_empty() {
        options = options.username(&cfg.user);
    }
    if !cfg.password.is_empty() {
        options = options.password(&cfg.password);
    }
    if !cfg.name.is_empty() {
        options = options.database(&cfg.name);
    }
    if !cfg.application_name.is_empty() {
        options = options.application_name(&cfg.application_name);
    }

    // sqlx logs every statement at debug level unless told otherwise.
    if !cfg.enable_db_logging {
        options = options.disable_statement_logging();
    }

    if let Some(keep_alive) = cfg.keep_alive() {
        let secs = keep_alive.as_secs().to_string();
        options = options.options([
            ("tcp_keepalives_idle", secs.as_str()),
            ("tcp_keepalives_interval", secs.as_str()),
        ]);
    }

    determine_tls(cfg, options)
}

/// Builds the pool sizing and expiry options. Zero values keep the sqlx defaults.
pub fn pool_options(cfg: &DatabaseConfig) -> PgPoolOptions {
    let mut pool = PgPoolOptions::new();

    if cfg.connection_pool_max > 0 {
        pool = pool.max_connections(cfg.connection_pool_max);
    }
    if cfg.connection_pool_min > 0 {
        pool = pool.min_connections(cfg.connection_pool_min);
    }
    if !cfg.connection_max_idle_time.is_zero() {
        pool = pool.idle_timeout(cfg.connection_max_idle_time);
    }
    if !cfg.connection_max_lifetime.is_zero() {
        // Hard ceiling. The randomised expiry inside the jitter window is
        // applied at checkout by the pool backend.
        pool = pool.max_lifetime(cfg.connection_max_lifetime + cfg.connection_max_lifetime_jitter);
    }
    if let Some(timeout) = cfg.dial_timeout() {
        pool = pool.acquire_timeout(timeout);
    }

    pool
}

/// A `postgres://` URL for log lines. The password is masked.
pub fn redacted_url(cfg: &DatabaseConfig) -> String {
    let port = if cfg.port.trim().is_empty() {
        DEFAULT_PORT.to_string()
    } else {
        cfg.port.trim().to_string()
    };
    format!(
        "postgres://{}:***@{}:{}/{}?sslmode={}&application_name={}",
        cfg.user, cfg.host, port, cfg.name, cfg.ssl_mode, cfg.application_name
    )
}

fn determine_tls(cfg: &DatabaseConfig, options: PgConnectOptions) -> Result<PgConnectOptions, DbError> {
    if cfg.ssl_disabled() {
        return Ok(options.ssl_mode(PgSslMode::Disable));
    }

    let mode = if cfg.ssl_mode.trim().is_empty() {
        PgSslMode::VerifyFull
    } else {
        PgSslMode::from_str(cfg.ssl_mode.trim()).map_err(|e| {
            DbError::ConnectionConfigError(format!("invalid ssl mode '{}': {e}", cfg.ssl_mode))
        })?
    };

    let certificate_path = required_path(&cfg.tls_certificate, "tls_certificate")?;
    let certificate = read_tls_file(certificate_path)?;
    if !contains_pem_block(&certificate, "CERTIFICATE") {
        return Err(DbError::ConnectionConfigError(format!(
            "client certificate {certificate_path:?} is not a PEM certificate"
        )));
    }

    let key_path = required_path(&cfg.tls_key, "tls_key")?;
    let key = read_tls_file(key_path)?;
    if !contains_pem_block(&key, "PRIVATE KEY") {
        return Err(DbError::ConnectionConfigError(format!(
            "client key {key_path:?} is not a PEM private key"
        )));
    }

    let ca_path = required_path(&cfg.tls_ca, "tls_ca")?;
    let certificate_authority = read_tls_file(ca_path)?;
    if !contains_pem_block(&certificate_authority, "CERTIFICATE") {
        return Err(DbError::InvalidCertificateAuthority(ca_path.to_path_buf()));
    }

    Ok(options
        .ssl_mode(mode)
        .ssl_client_cert_from_pem(certificate)
        .ssl_client_key_from_pem(key)
        .ssl_root_cert_from_pem(certificate_authority))
}

fn required_path<'a>(path: &'a Option<PathBuf>, field: &str) -> Result<&'a Path, DbError> {
    path.as_deref().ok_or_else(|| {
        DbError::ConnectionConfigError(format!(
            "database.{field} must be set unless ssl_mode is 'disable'"
        ))
    })
}

fn read_tls_file(path: &Path) -> Result<Vec<u8>, DbError> {
    std::fs::read(path).map_err(|source| DbError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })
}

/// Looks for a `-----BEGIN <label>-----` line; `label` may be a suffix such as
/// `PRIVATE KEY` to accept `RSA PRIVATE KEY`, `EC PRIVATE KEY` and friends.
fn contains_pem_block(contents: &[u8], label: &str) -> bool {
    let text = String::from_utf8_lossy(contents);
    let end_marker = format!("{label}-----");
    text.lines().any(|line| {
        let line = line.trim();
        line.starts_with("-----BEGIN ") && line.ends_with(&end_marker)
    })
}
