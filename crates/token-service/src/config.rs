//! Configuration loading and management

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::oauth::grant::GrantType;
use crate::records::{OAuthClient, ProviderRef};

/// Main configuration for the token service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Grant types the token endpoint accepts from any client
    #[serde(default = "default_grant_types")]
    pub grant_types_supported: Vec<GrantType>,

    /// Token configuration
    #[serde(default)]
    pub tokens: TokenConfig,

    /// Per-request deadline in seconds; store and provider calls are
    /// abandoned when it passes
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Identity providers the local provider will issue tokens for
    #[serde(default)]
    pub identity_providers: Vec<ProviderRef>,

    /// Clients seeded into the record store at startup (existing records win)
    #[serde(default)]
    pub clients: Vec<OAuthClient>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Access token lifetime in seconds (default: 1 hour)
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime_secs: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime_secs: default_access_token_lifetime(),
        }
    }
}

fn default_grant_types() -> Vec<GrantType> {
    vec![GrantType::AuthorizationCode, GrantType::RefreshToken]
}

fn default_access_token_lifetime() -> u64 {
    3600 // 1 hour
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grant_types_supported: default_grant_types(),
            tokens: TokenConfig::default(),
            request_timeout_secs: default_request_timeout(),
            identity_providers: Vec::new(),
            clients: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the config directory
    pub fn load(config_path: &str) -> Result<Self> {
        let config_file = Path::new(config_path).join("config.json");

        if config_file.exists() {
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read config file: {:?}", config_file))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| "Failed to parse config.json")?;
            config.validate()?;
            tracing::info!("Loaded configuration from {:?}", config_file);
            Ok(config)
        } else {
            tracing::info!(
                "No config file found at {:?}, using defaults",
                config_file
            );
            let config = Config::default();

            // Create config directory if it doesn't exist
            std::fs::create_dir_all(config_path)
                .with_context(|| format!("Failed to create config directory: {}", config_path))?;

            // Write default config for reference
            let content = serde_json::to_string_pretty(&config)?;
            std::fs::write(&config_file, content)
                .with_context(|| format!("Failed to write default config: {:?}", config_file))?;
            tracing::info!("Created default config at {:?}", config_file);

            Ok(config)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.grant_types_supported.is_empty() {
            anyhow::bail!("grant_types_supported must list at least one grant type");
        }
        if self.tokens.access_token_lifetime_secs == 0 {
            anyhow::bail!("tokens.access_token_lifetime_secs must be positive");
        }
        for client in &self.clients {
            if client.token_endpoint_auth_method.requires_secret()
                && client.client_secret_hash.is_empty()
            {
                anyhow::bail!(
                    "client {} uses {} but has no client_secret_hash",
                    client.client_id(),
                    client.token_endpoint_auth_method.as_str()
                );
            }
        }
        Ok(())
    }

    pub fn access_token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tokens.access_token_lifetime_secs as i64)
    }
}
