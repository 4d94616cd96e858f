use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_logging;
pub use settings::{
    Config, DatabaseConfig, LogFormat, LoggerConfig, SecurityString, SECURITY_STRING_LEN,
};

/// Prefix of every environment variable read by [`load_config`].
pub const ENV_PREFIX: &str = "AC";

/// Loads the application configuration from `config.toml` and the environment.
///
/// The file is optional. Environment variables override it and follow the
/// pattern `AC_<SECTION>__<FIELD>`, e.g. `AC_DATABASE__HOST` or
/// `AC_LOGGER__LEVEL`.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"), environment())
}

/// Loads the configuration from an explicit file path and environment source.
pub fn load_config_from(
    path: &Path,
    environment: config::Environment,
) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(environment)
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}

/// The environment source used by [`load_config`].
///
/// Values stay strings; numeric fields are parsed during deserialisation, so
/// secrets such as `007` keep their leading zeros.
pub fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}
