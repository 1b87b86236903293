use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    pub business: BusinessConfig,
}

/// HubNet account settings
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub balance_url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub sqlite_path: String,
    /// Remote store. Without it the relay runs on the local store alone.
    pub redis_url: Option<String>,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Copy local orders into the remote store at startup.
    #[serde(default)]
    pub migrate_on_start: bool,
}

fn default_namespace() -> String {
    "datasell".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessConfig {
    pub name: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "GHS".to_string()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Layer `default`, `{RUN_MODE}` and `local` files from `dir`, then
    /// `DATASELL__SECTION__KEY` environment variables.
    pub fn load_from(dir: impl AsRef<Path>) -> Result<Self, config::ConfigError> {
        let dir = dir.as_ref();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::from(dir.join("default")))
            .add_source(config::File::from(dir.join(&run_mode)).required(false))
            // Not checked in
            .add_source(config::File::from(dir.join("local")).required(false))
            .add_source(config::Environment::with_prefix("DATASELL").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
