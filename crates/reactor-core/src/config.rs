use serde::Deserialize;

use crate::cron::model::CronTaskDef;
use crate::error::ReactorError;

/// Which of `test|development|integration|qa|production` the process is
/// running under. Selects the `tracing` log-level preset, mirroring the
/// original's `settings/log_config.py`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Env {
    Test,
    Development,
    Integration,
    Qa,
    Production,
}

impl Env {
    /// Default `tracing` level for this environment.
    pub fn default_log_level(self) -> &'static str {
        match self {
            Env::Test | Env::Development => "debug",
            Env::Integration | Env::Qa | Env::Production => "info",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub timeout_seconds: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            timeout_seconds: 5,
        }
    }
}

impl RedisSettings {
    pub fn connection_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobsBackend {
    Redis,
    Immediate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    Memory,
    Null,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsSettings {
    pub polling_interval_ms: u64,
}

impl Default for EventsSettings {
    fn default() -> Self {
        Self {
            polling_interval_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CronSettings {
    pub polling_interval_ms: Option<u64>,
    #[serde(default)]
    pub tasks: Vec<CronTaskDef>,
}

impl CronSettings {
    pub fn polling_interval_ms(&self) -> u64 {
        self.polling_interval_ms.unwrap_or(1_000)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub timeout_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsSettings {
    pub backend: JobsBackend,
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            backend: JobsBackend::Immediate,
        }
    }
}

/// Top-level configuration, loaded from `reactor.toml` (or the path named by
/// `REACTOR_CONFIG`) with environment variable overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_env")]
    pub env: Env,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub events: EventsSettings,
    #[serde(default)]
    pub cron: CronSettings,
    #[serde(default)]
    pub jobs: JobsSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    /// Listen port for the enclosing HTTP service. Recognized for
    /// forward-compatibility with an embedding web layer; nothing in this
    /// crate reads it.
    #[serde(default)]
    pub application_port: Option<u16>,
}

fn default_env() -> Env {
    Env::Development
}

impl Settings {
    /// Load configuration from `path` (TOML), then apply the
    /// `REDIS_HOST`/`REDIS_PORT`/`REDIS_DB`/`REDIS_TIMEOUT` environment
    /// overrides, which always win over file values (per the distilled
    /// spec's external-interfaces section).
    pub fn load(path: &str) -> Result<Self, ReactorError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("REACTOR")
                    .separator("__")
                    .try_parsing(true),
            );

        let cfg = builder
            .build()
            .map_err(|e| ReactorError::Config(e.to_string()))?;

        let mut settings: Settings = cfg
            .try_deserialize()
            .map_err(|e| ReactorError::Config(e.to_string()))?;

        settings.apply_redis_env_overrides();
        Ok(settings)
    }

    fn apply_redis_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("REDIS_HOST") {
            self.redis.host = host;
        }
        if let Ok(port) = std::env::var("REDIS_PORT") {
            if let Ok(port) = port.parse() {
                self.redis.port = port;
            }
        }
        if let Ok(db) = std::env::var("REDIS_DB") {
            if let Ok(db) = db.parse() {
                self.redis.db = db;
            }
        }
        if let Ok(timeout) = std::env::var("REDIS_TIMEOUT") {
            if let Ok(timeout) = timeout.parse() {
                self.redis.timeout_seconds = timeout;
            }
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env: Env::Development,
            redis: RedisSettings::default(),
            events: EventsSettings::default(),
            cron: CronSettings::default(),
            jobs: JobsSettings::default(),
            cache: CacheSettings::default(),
            application_port: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_env_is_development() {
        assert_eq!(Settings::default().env, Env::Development);
    }

    #[test]
    fn default_log_level_per_env() {
        assert_eq!(Env::Test.default_log_level(), "debug");
        assert_eq!(Env::Development.default_log_level(), "debug");
        assert_eq!(Env::Production.default_log_level(), "info");
    }

    #[test]
    fn redis_connection_url_format() {
        let redis = RedisSettings {
            host: "redis.internal".to_string(),
            port: 6380,
            db: 2,
            timeout_seconds: 5,
        };
        assert_eq!(redis.connection_url(), "redis://redis.internal:6380/2");
    }

    #[test]
    fn env_override_wins_over_default() {
        std::env::set_var("REDIS_HOST", "override-host");
        std::env::set_var("REDIS_PORT", "1234");
        let mut settings = Settings::default();
        settings.apply_redis_env_overrides();
        assert_eq!(settings.redis.host, "override-host");
        assert_eq!(settings.redis.port, 1234);
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("REDIS_PORT");
    }

    #[test]
    fn cron_polling_interval_defaults_to_one_second() {
        let cron = CronSettings::default();
        assert_eq!(cron.polling_interval_ms(), 1_000);
    }

    #[test]
    fn load_reads_a_toml_file_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reactor.toml");
        std::fs::write(
            &path,
            r#"
            env = "production"

            [redis]
            host = "redis-prod"
            port = 6380
            db = 3
            timeout_seconds = 2
            "#,
        )
        .unwrap();

        // `config::File::with_name` strips the extension itself, so pass the
        // path without it.
        let path_without_ext = path.with_extension("");
        let settings = Settings::load(path_without_ext.to_str().unwrap()).unwrap();

        assert_eq!(settings.env, Env::Production);
        assert_eq!(settings.redis.host, "redis-prod");
        assert_eq!(settings.redis.port, 6380);
    }

    #[test]
    fn load_tolerates_a_missing_file_and_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        let settings = Settings::load(path.to_str().unwrap()).unwrap();
        let defaults = Settings::default();
        assert_eq!(settings.env, defaults.env);
        assert_eq!(settings.redis.host, defaults.redis.host);
    }
}
