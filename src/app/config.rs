use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::models::gateway::Gateway;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid endpoint for gateway {gateway}: {reason}")]
    Endpoint { gateway: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server_port: u16,
    pub credential_store_path: PathBuf,
    pub credential_namespace: String,
    pub attempt_timeout_ms: u64,
    pub retry_max_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub retry_jitter: bool,
    pub idempotency_enabled: bool,
    pub idempotency_ttl_secs: u64,
    pub simulated_card_delay_ms: u64,
    pub simulated_pix_delay_ms: u64,
    pub simulated_probe_delay_ms: u64,
    pub max_installments: u32,
    /// Gateways com integração HTTP real; os demais são simulados.
    pub gateway_endpoints: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 9999,
            credential_store_path: PathBuf::from("data/local-storage.json"),
            credential_namespace: "payment_gateway_config".to_string(),
            attempt_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 200,
            retry_max_backoff_ms: 2_000,
            retry_jitter: true,
            idempotency_enabled: true,
            idempotency_ttl_secs: 86_400,
            simulated_card_delay_ms: 2_000,
            simulated_pix_delay_ms: 1_500,
            simulated_probe_delay_ms: 1_000,
            max_installments: 12,
            gateway_endpoints: BTreeMap::new(),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut gateway_endpoints = BTreeMap::new();
        for gateway in Gateway::SUPPORTED.iter().filter(|g| **g != Gateway::Cash) {
            let key = format!("GATEWAY_{}_URL", gateway.id_prefix());
            if let Ok(url) = env::var(&key) {
                if !url.trim().is_empty() {
                    gateway_endpoints.insert(gateway.to_string(), url.trim().to_string());
                }
            }
        }

        Self {
            server_port: env_or("PORT", defaults.server_port),
            credential_store_path: env::var("CREDENTIAL_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.credential_store_path),
            credential_namespace: env::var("CREDENTIAL_NAMESPACE")
                .unwrap_or(defaults.credential_namespace),
            attempt_timeout_ms: env_or("ATTEMPT_TIMEOUT_MS", defaults.attempt_timeout_ms),
            retry_max_attempts: env_or("RETRY_MAX_ATTEMPTS", defaults.retry_max_attempts),
            retry_initial_backoff_ms: env_or(
                "RETRY_INITIAL_BACKOFF_MS",
                defaults.retry_initial_backoff_ms,
            ),
            retry_max_backoff_ms: env_or("RETRY_MAX_BACKOFF_MS", defaults.retry_max_backoff_ms),
            retry_jitter: env_or("RETRY_JITTER", defaults.retry_jitter),
            idempotency_enabled: env_or("IDEMPOTENCY_ENABLED", defaults.idempotency_enabled),
            idempotency_ttl_secs: env_or("IDEMPOTENCY_TTL_SECS", defaults.idempotency_ttl_secs),
            simulated_card_delay_ms: env_or(
                "SIMULATED_CARD_DELAY_MS",
                defaults.simulated_card_delay_ms,
            ),
            simulated_pix_delay_ms: env_or("SIMULATED_PIX_DELAY_MS", defaults.simulated_pix_delay_ms),
            simulated_probe_delay_ms: env_or(
                "SIMULATED_PROBE_DELAY_MS",
                defaults.simulated_probe_delay_ms,
            ),
            max_installments: env_or("MAX_INSTALLMENTS", defaults.max_installments),
            gateway_endpoints,
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.gateway_endpoints.keys() {
            self.endpoint_for(&Gateway::from(name.clone()))?;
        }
        Ok(())
    }

    /// Endpoint HTTP configurado para o gateway, se houver.
    pub fn endpoint_for(&self, gateway: &Gateway) -> Result<Option<Url>, ConfigError> {
        let raw = match self.gateway_endpoints.get(gateway.as_str()) {
            Some(raw) => raw,
            None => return Ok(None),
        };

        if !gateway.is_supported() || *gateway == Gateway::Cash {
            return Err(ConfigError::Endpoint {
                gateway: gateway.to_string(),
                reason: "gateway cannot have a remote endpoint".to_string(),
            });
        }

        let url = Url::parse(raw).map_err(|e| ConfigError::Endpoint {
            gateway: gateway.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(Some(url)),
            other => Err(ConfigError::Endpoint {
                gateway: gateway.to_string(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn idempotency_ttl(&self) -> Duration {
        Duration::from_secs(self.idempotency_ttl_secs)
    }
}
