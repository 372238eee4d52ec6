use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default config file path when --config is not given
pub const DEFAULT_CONFIG_PATH: &str = "nasbridge.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Backend processing engine RPC endpoint
    pub url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Failures in Closed state before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive successes in HalfOpen before the circuit closes
    pub success_threshold: u32,
    /// Wait before the first HalfOpen attempt
    pub base_timeout_secs: u64,
    /// Backoff ceiling
    pub max_timeout_secs: u64,
    /// Growth factor applied to the wait on each re-open
    pub backoff_multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Bound per-client outbound queue size
    pub send_buffer_size: usize,
    /// Interval between server keepalive pings
    pub keepalive_interval_secs: u64,
    /// How long to wait for a pong before closing
    pub keepalive_grace_secs: u64,
    /// Close clients with no inbound activity for this long
    pub client_idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub system_status_interval_secs: u64,
    pub job_progress_interval_secs: u64,
    pub worker_status_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8090,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9070/rpc".to_string(),
            request_timeout_secs: 8,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            base_timeout_secs: 10,
            max_timeout_secs: 300, // 5 minutes
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            send_buffer_size: 256,
            keepalive_interval_secs: 30,
            keepalive_grace_secs: 10,
            client_idle_timeout_secs: 90,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            system_status_interval_secs: 5,
            job_progress_interval_secs: 2,
            worker_status_interval_secs: 15,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            engine: EngineConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            websocket: WebSocketConfig::default(),
            poller: PollerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            let default_config = Self::default();
            default_config.save(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.circuit_breaker.failure_threshold == 0 {
            anyhow::bail!("circuit_breaker.failure_threshold must be at least 1");
        }
        if self.circuit_breaker.success_threshold == 0 {
            anyhow::bail!("circuit_breaker.success_threshold must be at least 1");
        }
        if self.circuit_breaker.backoff_multiplier < 1.0 {
            anyhow::bail!("circuit_breaker.backoff_multiplier must be >= 1.0");
        }
        if self.websocket.send_buffer_size == 0 {
            anyhow::bail!("websocket.send_buffer_size must be at least 1");
        }
        Ok(())
    }
}

/// Process-global config storage
static CONFIG: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Initialize the global config from a file path
pub fn init(path: &str) -> Result<()> {
    let config = Config::load(path)?;
    *CONFIG.write() = config;
    Ok(())
}

/// Read access to the global config
pub fn with_config<T>(f: impl FnOnce(&Config) -> T) -> T {
    f(&CONFIG.read())
}

/// Replace the global config (tests and reload paths)
pub fn set_config(config: Config) {
    *CONFIG.write() = config;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_product_settings() {
        let cfg = Config::default();
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker.success_threshold, 2);
        assert_eq!(cfg.circuit_breaker.base_timeout_secs, 10);
        assert_eq!(cfg.circuit_breaker.max_timeout_secs, 300);
        assert_eq!(cfg.websocket.send_buffer_size, 256);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nasbridge.json");
        let path_str = path.to_str().unwrap();

        let cfg = Config::load(path_str).unwrap();
        assert!(path.exists());
        assert_eq!(cfg.gateway.port, 8090);

        // Round trip
        let reloaded = Config::load(path_str).unwrap();
        assert_eq!(reloaded.engine.url, cfg.engine.url);
    }

    #[test]
    fn test_validation_rejects_zero_thresholds() {
        let mut cfg = Config::default();
        cfg.circuit_breaker.failure_threshold = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.websocket.send_buffer_size = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_config_uses_section_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"gateway":{"host":"0.0.0.0","port":9000}}"#)
            .unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.poller.system_status_interval_secs, 5);
    }
}
