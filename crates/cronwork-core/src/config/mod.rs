//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod app;
pub mod database;
pub mod jobs;
pub mod logging;
pub mod scheduler;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::database::{DatabaseConfig, StoreBackend};
pub use self::jobs::{JobConfig, JobKind};
pub use self::logging::LoggingConfig;
pub use self::scheduler::{MetricsConfig, SchedulerConfig};

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Run store settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Scheduling engine settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Jobs to register at startup.
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `CRONWORK__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CRONWORK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express.
    ///
    /// Individual `[[jobs]]` entries are not checked here; a malformed job
    /// only fails its own registration.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.database.backend == StoreBackend::Postgres && self.database.url.is_empty() {
            return Err(AppError::configuration(
                "database.url is required for the postgres backend",
            ));
        }

        if self.scheduler.default_max_retries < 0 {
            return Err(AppError::configuration(
                "scheduler.default_max_retries must not be negative",
            ));
        }

        Ok(())
    }
}
