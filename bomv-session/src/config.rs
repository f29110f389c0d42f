//! Gateway settings resolution
//!
//! Resolves the gateway URL and API token with CLI → ENV → TOML priority.

use bomv_common::config::TomlConfig;
use bomv_common::{Error, Result};
use std::time::Duration;
use tracing::{info, warn};

pub const GATEWAY_URL_ENV_VAR: &str = "BOMV_GATEWAY_URL";
pub const API_TOKEN_ENV_VAR: &str = "BOMV_API_TOKEN";

/// Effective gateway connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_token: Option<String>,
    pub request_timeout: Duration,
}

/// Resolve gateway settings
///
/// **Priority:** command-line → environment → TOML
pub fn resolve_gateway_settings(
    toml_config: &TomlConfig,
    cli_url: Option<&str>,
) -> Result<GatewaySettings> {
    let env_url = non_empty_env(GATEWAY_URL_ENV_VAR);
    let cli_url = cli_url.map(str::trim).filter(|url| !url.is_empty());

    let mut sources = Vec::new();
    if cli_url.is_some() {
        sources.push("command line");
    }
    if env_url.is_some() {
        sources.push("environment");
    }
    if sources.len() > 1 {
        warn!(
            "Gateway URL found in multiple sources: {}. Using {}.",
            sources.join(", "),
            sources[0]
        );
    }

    let base_url = if let Some(url) = cli_url {
        info!("Gateway URL loaded from command line");
        url.to_string()
    } else if let Some(url) = env_url {
        info!("Gateway URL loaded from environment variable");
        url
    } else {
        info!("Gateway URL loaded from TOML config");
        toml_config.gateway.base_url.clone()
    };

    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(Error::Config(format!(
            "Gateway URL must start with http:// or https://, got '{}'",
            base_url
        )));
    }

    let api_token = match non_empty_env(API_TOKEN_ENV_VAR) {
        Some(token) => {
            info!("API token loaded from environment variable");
            Some(token)
        }
        None => toml_config
            .gateway
            .api_token
            .clone()
            .filter(|token| !token.trim().is_empty()),
    };

    Ok(GatewaySettings {
        base_url,
        api_token,
        request_timeout: Duration::from_secs(toml_config.gateway.request_timeout_secs.max(1)),
    })
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        std::env::remove_var(GATEWAY_URL_ENV_VAR);
        std::env::remove_var(API_TOKEN_ENV_VAR);
    }

    #[test]
    #[serial]
    fn test_toml_used_without_overrides() {
        clear_env();
        let mut config = TomlConfig::default();
        config.gateway.api_token = Some("toml-token".to_string());

        let settings = resolve_gateway_settings(&config, None).unwrap();
        assert_eq!(settings.base_url, "http://localhost:8000/api");
        assert_eq!(settings.api_token.as_deref(), Some("toml-token"));
        assert_eq!(settings.request_timeout, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_env_overrides_toml() {
        clear_env();
        std::env::set_var(GATEWAY_URL_ENV_VAR, "https://bom.example.com/api");
        std::env::set_var(API_TOKEN_ENV_VAR, "env-token");

        let mut config = TomlConfig::default();
        config.gateway.api_token = Some("toml-token".to_string());
        let settings = resolve_gateway_settings(&config, None);
        clear_env();

        let settings = settings.unwrap();
        assert_eq!(settings.base_url, "https://bom.example.com/api");
        assert_eq!(settings.api_token.as_deref(), Some("env-token"));
    }

    #[test]
    #[serial]
    fn test_cli_overrides_env() {
        clear_env();
        std::env::set_var(GATEWAY_URL_ENV_VAR, "https://bom.example.com/api");

        let settings = resolve_gateway_settings(&TomlConfig::default(), Some("http://127.0.0.1:9000"));
        clear_env();

        assert_eq!(settings.unwrap().base_url, "http://127.0.0.1:9000");
    }

    #[test]
    #[serial]
    fn test_rejects_non_http_url() {
        clear_env();
        let result = resolve_gateway_settings(&TomlConfig::default(), Some("ftp://files"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
