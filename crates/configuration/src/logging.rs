use crate::error::ConfigError;
use crate::settings::{LogFormat, LoggerConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Output goes to stdout through a non-blocking writer. The returned guard
/// flushes buffered lines when dropped, so keep it alive for the lifetime of
/// the process.
pub fn init_logging(cfg: &LoggerConfig) -> Result<WorkerGuard, ConfigError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cfg.level).map_err(|e| {
            ConfigError::LoggingError(format!("invalid log level '{}': {e}", cfg.level))
        })?,
    };

    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    let installed = match cfg.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| ConfigError::LoggingError(e.to_string()))?;

    tracing::debug!(level = %cfg.level, format = ?cfg.format, "logging initialised");
    Ok(guard)
}
