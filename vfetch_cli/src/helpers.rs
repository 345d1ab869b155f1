use std::path::Path;

use anyhow::Context;
use vfetch_gateway::GatewayConfig;

/// Settings given on the command line; each one that is set replaces the
/// value from the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub gateways: Vec<String>,
    pub user_agent: Option<String>,
    /// A limit of 0 means no limit.
    pub limit: Option<u64>,
}

pub async fn load_config(path: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    let Some(path) = path else {
        return Ok(GatewayConfig::default());
    };
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    GatewayConfig::from_toml(&content)
        .with_context(|| format!("invalid config file {}", path.display()))
}

pub fn apply_overrides(mut config: GatewayConfig, overrides: Overrides) -> GatewayConfig {
    if !overrides.gateways.is_empty() {
        config.gateways = overrides.gateways;
    }
    if let Some(user_agent) = overrides.user_agent.filter(|ua| !ua.is_empty()) {
        config.user_agent = Some(user_agent);
    }
    match overrides.limit {
        Some(0) => config.limit = None,
        Some(limit) => config.limit = Some(limit),
        None => {}
    }
    config
}
