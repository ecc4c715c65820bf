//! Configuration management

use serde::Deserialize;
use sqslite_sqs::storage::MAX_VISIBILITY_TIMEOUT;
use sqslite_sqs::RegistryConfig;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sqs: SqsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Base of the queue URLs handed to clients; derived from the port when unset
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            endpoint_url: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SqsConfig {
    #[serde(default = "default_account_id")]
    pub account_id: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_visibility_timeout")]
    pub default_visibility_timeout: u32,
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            account_id: default_account_id(),
            region: default_region(),
            default_visibility_timeout: default_visibility_timeout(),
        }
    }
}

fn default_port() -> u16 {
    4566
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_account_id() -> String {
    "000000000000".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_visibility_timeout() -> u32 {
    30
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Reads `sqslite.toml` from the working directory unless `path` names
    /// another file, then applies `SQSLITE__SECTION__KEY` overrides.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("sqslite").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("SQSLITE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config = config.try_deserialize::<Config>()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the queue engine would refuse at first use
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.sqs.default_visibility_timeout <= MAX_VISIBILITY_TIMEOUT,
            "sqs.default_visibility_timeout must be between 0 and {}, got {}",
            MAX_VISIBILITY_TIMEOUT,
            self.sqs.default_visibility_timeout
        );
        Ok(())
    }

    pub fn endpoint_url(&self) -> String {
        self.server
            .endpoint_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.server.port))
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            endpoint_url: self.endpoint_url(),
            account_id: self.sqs.account_id.clone(),
            region: self.sqs.region.clone(),
            default_visibility_timeout: self.sqs.default_visibility_timeout,
        }
    }
}
