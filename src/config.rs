//! Configuration loaded from the environment.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `REMOTE_STORAGE_URL` | unset | Base URL for skill bundle downloads |
//! | `INTERNAL_SERVICE_TOKEN` | unset | Bearer token for bundle downloads |
//! | `REMOTE_STORAGE_TOKEN` | unset | Fallback when the service token is unset |
//! | `SKILL_PUBLIC_OWNER_ID` | `0` | Owner id whose skills may load code |
//! | `SKILL_MCP_CONNECT_TIMEOUT_SECS` | `30` | Bound on one MCP connect batch |
//! | `SKILL_DOWNLOAD_TIMEOUT_SECS` | `30` | Bound on one bundle download |

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::tools::wasm::WasmRuntimeConfig;

/// Owner id reserved for system-published (public) skills.
pub const PUBLIC_OWNER_ID: i64 = 0;

/// Default bound on connecting a batch of MCP servers.
pub const DEFAULT_MCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on downloading a skill bundle.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration for skill orchestration.
#[derive(Debug)]
pub struct SkillHostConfig {
    /// Base URL of the remote storage API, without trailing slash.
    pub remote_storage_url: Option<String>,
    /// Token sent as `Authorization: Bearer` when downloading bundles.
    pub service_token: Option<SecretString>,
    /// Owner id whose skills pass the code-loading gate.
    pub public_owner_id: i64,
    /// Timeout applied to each MCP connect batch.
    pub mcp_connect_timeout: Duration,
    /// Timeout applied to each bundle download.
    pub download_timeout: Duration,
    /// Sandbox limits for WASM skill providers.
    pub wasm: WasmRuntimeConfig,
}

impl Default for SkillHostConfig {
    fn default() -> Self {
        Self {
            remote_storage_url: None,
            service_token: None,
            public_owner_id: PUBLIC_OWNER_ID,
            mcp_connect_timeout: DEFAULT_MCP_CONNECT_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            wasm: WasmRuntimeConfig::default(),
        }
    }
}

impl SkillHostConfig {
    /// Load configuration from the process environment.
    ///
    /// A `.env` file in the working directory is honoured if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let remote_storage_url = match non_empty("REMOTE_STORAGE_URL") {
            Some(raw) => {
                let trimmed = raw.trim().trim_end_matches('/').to_string();
                url::Url::parse(&trimmed).map_err(|e| ConfigError::InvalidValue {
                    key: "REMOTE_STORAGE_URL".to_string(),
                    message: e.to_string(),
                })?;
                Some(trimmed)
            }
            None => None,
        };

        let service_token = non_empty("INTERNAL_SERVICE_TOKEN")
            .or_else(|| non_empty("REMOTE_STORAGE_TOKEN"))
            .map(SecretString::from);

        let public_owner_id = match non_empty("SKILL_PUBLIC_OWNER_ID") {
            Some(raw) => raw
                .trim()
                .parse::<i64>()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "SKILL_PUBLIC_OWNER_ID".to_string(),
                    message: e.to_string(),
                })?,
            None => PUBLIC_OWNER_ID,
        };

        let mcp_connect_timeout = parse_secs(
            non_empty("SKILL_MCP_CONNECT_TIMEOUT_SECS"),
            "SKILL_MCP_CONNECT_TIMEOUT_SECS",
            DEFAULT_MCP_CONNECT_TIMEOUT,
        )?;
        let download_timeout = parse_secs(
            non_empty("SKILL_DOWNLOAD_TIMEOUT_SECS"),
            "SKILL_DOWNLOAD_TIMEOUT_SECS",
            DEFAULT_DOWNLOAD_TIMEOUT,
        )?;

        Ok(Self {
            remote_storage_url,
            service_token,
            public_owner_id,
            mcp_connect_timeout,
            download_timeout,
            wasm: WasmRuntimeConfig::default(),
        })
    }
}

fn parse_secs(raw: Option<String>, key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    let secs = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = SkillHostConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.remote_storage_url.is_none());
        assert!(config.service_token.is_none());
        assert_eq!(config.public_owner_id, PUBLIC_OWNER_ID);
        assert_eq!(config.mcp_connect_timeout, Duration::from_secs(30));
        assert_eq!(config.download_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_storage_url_trailing_slash_trimmed() {
        let config = SkillHostConfig::from_lookup(lookup(&[(
            "REMOTE_STORAGE_URL",
            "http://backend:8000/api/",
        )]))
        .unwrap();
        assert_eq!(
            config.remote_storage_url.as_deref(),
            Some("http://backend:8000/api")
        );
    }

    #[test]
    fn test_invalid_storage_url_rejected() {
        let err = SkillHostConfig::from_lookup(lookup(&[("REMOTE_STORAGE_URL", "not a url")]))
            .unwrap_err();
        assert!(err.to_string().contains("REMOTE_STORAGE_URL"));
    }

    #[test]
    fn test_service_token_falls_back_to_storage_token() {
        let config =
            SkillHostConfig::from_lookup(lookup(&[("REMOTE_STORAGE_TOKEN", "fallback")])).unwrap();
        assert_eq!(
            config.service_token.as_ref().map(|t| t.expose_secret()),
            Some("fallback")
        );

        let config = SkillHostConfig::from_lookup(lookup(&[
            ("INTERNAL_SERVICE_TOKEN", "primary"),
            ("REMOTE_STORAGE_TOKEN", "fallback"),
        ]))
        .unwrap();
        assert_eq!(
            config.service_token.as_ref().map(|t| t.expose_secret()),
            Some("primary")
        );
    }

    #[test]
    fn test_timeouts_parsed() {
        let config = SkillHostConfig::from_lookup(lookup(&[
            ("SKILL_MCP_CONNECT_TIMEOUT_SECS", "5"),
            ("SKILL_DOWNLOAD_TIMEOUT_SECS", "12"),
        ]))
        .unwrap();
        assert_eq!(config.mcp_connect_timeout, Duration::from_secs(5));
        assert_eq!(config.download_timeout, Duration::from_secs(12));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let err = SkillHostConfig::from_lookup(lookup(&[("SKILL_MCP_CONNECT_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = SkillHostConfig::from_lookup(lookup(&[("SKILL_DOWNLOAD_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_public_owner_override() {
        let config =
            SkillHostConfig::from_lookup(lookup(&[("SKILL_PUBLIC_OWNER_ID", "-1")])).unwrap();
        assert_eq!(config.public_owner_id, -1);
    }
}
