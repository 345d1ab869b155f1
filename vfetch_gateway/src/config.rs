use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

pub const DEFAULT_GATEWAY: &str = "https://trustless-gateway.link";
pub const DEFAULT_BLOCK_TIMEOUT_SECS: u64 = 60;

/// Settings for talking to trustless gateways.
///
/// Loadable from TOML:
///
/// ```toml
/// gateways = ["https://trustless-gateway.link", "https://ipfs.example.org"]
/// limit = 104857600
/// user_agent = "verified-fetch/0.1"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URLs; one is picked uniformly at random per request.
    pub gateways: Vec<String>,
    /// Maximum response body size in bytes.
    pub limit: Option<u64>,
    pub user_agent: Option<String>,
    /// Check raw blocks against their CID. Only disable for gateways that
    /// are trusted anyway.
    pub validate: bool,
    pub block_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateways: vec![DEFAULT_GATEWAY.to_string()],
            limit: None,
            user_agent: None,
            validate: true,
            block_timeout_secs: DEFAULT_BLOCK_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| GatewayError::Config(err.to_string()))
    }

    pub fn with_gateways(mut self, gateways: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.gateways = gateways.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config = GatewayConfig::from_toml("limit = 1024").unwrap();
        assert_eq!(config.gateways, vec![DEFAULT_GATEWAY.to_string()]);
        assert_eq!(config.limit, Some(1024));
        assert!(config.validate);
        assert_eq!(config.block_timeout_secs, 60);
    }

    #[test]
    fn test_full_config() {
        let config = GatewayConfig::from_toml(
            r#"
            gateways = ["https://a.example", "https://b.example"]
            user_agent = "tester"
            validate = false
            block_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.gateways.len(), 2);
        assert_eq!(config.user_agent.as_deref(), Some("tester"));
        assert!(!config.validate);
        assert_eq!(config.block_timeout_secs, 5);
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            GatewayConfig::from_toml("gateways = 3"),
            Err(GatewayError::Config(_))
        ));
    }
}
