use crate::scrapers::fetch::DEFAULT_USER_AGENT;
use serde::Deserialize;
use std::time::Duration;

/// Runtime settings. Defaults below, overridden by `SOUK_*` environment
/// variables (a `.env` file is loaded first when present).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    /// "mubawab", "avito" or "all"
    pub source: String,
    pub city: String,
    pub property_type: String,
    pub max_pages: u32,
    pub request_timeout_secs: u64,
    pub delay_base_ms: u64,
    pub delay_jitter_ms: u64,
    pub user_agent: String,
    pub snapshot_path: String,
    pub concurrent_sources: bool,
    pub deactivate_missing: bool,
    /// 0 disables the deadline
    pub run_deadline_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        Self::from_env(Self::environment())
    }

    /// `SOUK_MAX_PAGES` style keys; `__` is kept for nesting
    fn environment() -> config::Environment {
        config::Environment::with_prefix("SOUK")
            .prefix_separator("_")
            .separator("__")
    }

    fn from_env(env: config::Environment) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .set_default("log_level", "info")?
            .set_default("source", "all")?
            .set_default("city", "Marrakech")?
            .set_default("property_type", "all")?
            .set_default("max_pages", 3)?
            .set_default("request_timeout_secs", 15)?
            .set_default("delay_base_ms", 1500)?
            .set_default("delay_jitter_ms", 1000)?
            .set_default("user_agent", DEFAULT_USER_AGENT)?
            .set_default("snapshot_path", "data/listings.json")?
            .set_default("concurrent_sources", false)?
            .set_default("deactivate_missing", false)?
            .set_default("run_deadline_secs", 0)?
            .add_source(env)
            .build()?;
        cfg.try_deserialize()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn delay_base(&self) -> Duration {
        Duration::from_millis(self.delay_base_ms)
    }

    pub fn delay_jitter(&self) -> Duration {
        Duration::from_millis(self.delay_jitter_ms)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        (self.run_deadline_secs > 0).then(|| Duration::from_secs(self.run_deadline_secs))
    }
}
