use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub holds: HoldRules,
    pub availability: AvailabilityRules,
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: Option<String>,
    /// Load the demo services and stylists at startup.
    #[serde(default)]
    pub seed_demo: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HoldRules {
    pub ttl_seconds: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_sweep_interval() -> u64 { 30 }

#[derive(Debug, Deserialize, Clone)]
pub struct AvailabilityRules {
    #[serde(default = "default_max_range_days")]
    pub max_range_days: i64,
    #[serde(default = "default_jump_max_weeks")]
    pub jump_max_weeks: u32,
}

fn default_max_range_days() -> i64 { 62 }
fn default_jump_max_weeks() -> u32 { 8 }

impl Default for AvailabilityRules {
    fn default() -> Self {
        Self {
            max_range_days: default_max_range_days(),
            jump_max_weeks: default_jump_max_weeks(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SALON__HOLDS__TTL_SECONDS=600`
            .add_source(config::Environment::with_prefix("SALON").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would stall or panic a background loop.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.holds.ttl_seconds == 0 {
            return Err(config::ConfigError::Message("holds.ttl_seconds must be at least 1".into()));
        }
        if self.holds.sweep_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "holds.sweep_interval_seconds must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn hold_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.holds.ttl_seconds as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(ttl_seconds: u64, sweep_interval_seconds: u64) -> Config {
        Config {
            server: ServerConfig { port: 8080 },
            store: StoreConfig { backend: StoreBackend::Memory, redis_url: None, seed_demo: false },
            holds: HoldRules { ttl_seconds, sweep_interval_seconds },
            availability: AvailabilityRules::default(),
            auth: AuthConfig { jwt_secret: "secret".into() },
        }
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        assert!(config(300, 30).validate().is_ok());
        assert!(config(300, 0).validate().is_err());
        assert!(config(0, 30).validate().is_err());
    }
}
