use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::config::AppConfig;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads configuration by layering `config/Config.toml` and
    /// `CYCLE_TRADE_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be read or parsed.
    pub fn load() -> Result<AppConfig> {
        Self::load_from("config/Config.toml")
    }

    /// Loads configuration from a specific TOML file path.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<AppConfig> {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("CYCLE_TRADE_").split("__"))
            .extract()?;

        Ok(config)
    }
}
