//! Process configuration: coordination store URL, Docker socket, spec and
//! pool-config paths, reconciler interval, label overrides.
//!
//! Priority: environment variables > config file > defaults, matching the
//! loading convention used throughout this codebase.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlockdConfig {
    pub docker_socket: String,
    pub redis_url: String,
    pub spec_path: String,
    pub pool_config_path: String,
    pub reconciler_interval_secs: u64,
    pub request_label: String,
    pub deferred_label: String,
    pub pool_label: String,
    pub network_label: String,
    pub log_level: String,
}

impl Default for FlockdConfig {
    fn default() -> Self {
        Self {
            docker_socket: String::new(),
            redis_url: "redis://127.0.0.1/".to_string(),
            spec_path: "./flocks".to_string(),
            pool_config_path: "./pools.yaml".to_string(),
            reconciler_interval_secs: 30,
            request_label: crate::labels::REQUEST_LABEL.to_string(),
            deferred_label: crate::labels::DEFERRED_LABEL.to_string(),
            pool_label: crate::labels::POOL_LABEL.to_string(),
            network_label: crate::labels::NETWORK_LABEL.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl FlockdConfig {
    /// Load configuration from file or environment variables.
    /// Priority: Environment Variables > Config File > Defaults.
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        let config_path =
            std::env::var("FLOCKD_CONFIG_FILE").unwrap_or_else(|_| "flockd.toml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            tracing::info!("loading configuration from {}", config_path);
            Self::from_file(&config_path)?
        } else {
            tracing::info!("no config file at {}, using environment/defaults", config_path);
            Self::from_env()
        };

        if let Ok(socket) = std::env::var("DOCKER_SOCKET") {
            config.docker_socket = socket;
        }
        if let Ok(url) = std::env::var("FLOCKD_REDIS_URL") {
            config.redis_url = url;
        }
        if let Ok(path) = std::env::var("FLOCKD_SPEC_PATH") {
            config.spec_path = path;
        }
        if let Ok(path) = std::env::var("FLOCKD_POOL_CONFIG") {
            config.pool_config_path = path;
        }
        if let Ok(secs) = std::env::var("FLOCKD_RECONCILER_INTERVAL") {
            if let Ok(secs) = secs.parse() {
                config.reconciler_interval_secs = secs;
            }
        }
        if let Ok(level) = std::env::var("FLOCKD_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(socket) = std::env::var("DOCKER_SOCKET") {
            config.docker_socket = socket;
        }
        if let Ok(url) = std::env::var("FLOCKD_REDIS_URL") {
            config.redis_url = url;
        }
        config
    }

    /// Validate configuration values and required paths. `reconciler_interval_secs
    /// == 0` is a valid, deliberate "disabled" setting per the reconciler's
    /// design, not an error.
    pub fn validate(&self) -> Result<(), String> {
        if self.redis_url.is_empty() {
            return Err("redis_url must not be empty".to_string());
        }
        if !Path::new(&self.spec_path).exists() {
            return Err(format!("spec_path not found: {}", self.spec_path));
        }
        if !Path::new(&self.pool_config_path).exists() {
            return Err(format!(
                "pool_config_path not found: {}",
                self.pool_config_path
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = FlockdConfig::default();
        assert_eq!(config.reconciler_interval_secs, 30);
        assert_eq!(config.request_label, "owt.shepherd.reqid");
    }

    #[test]
    fn validate_rejects_empty_redis_url() {
        let mut config = FlockdConfig::default();
        config.redis_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_spec_path() {
        let mut config = FlockdConfig::default();
        config.spec_path = "/nonexistent/path/for/tests".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.contains("spec_path"));
    }
}
