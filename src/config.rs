use crate::adapters::ProtocolType;
use crate::error::{BrokerError, Result};
use crate::registry::{Model, ModelRegistry, Target};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Prefix marking an API key as an environment variable reference.
const ENV_PREFIX: &str = "env:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub alias: String,
    #[serde(rename = "type")]
    pub protocol: ProtocolType,
    pub target: TargetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    pub url: String,
    pub model: String,
    /// Literal key or `env:VAR`.
    #[serde(default)]
    pub api_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_path: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8080
}

impl BrokerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BrokerError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > ~/.config > home dir
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<(Self, PathBuf)> {
        if let Some(path) = explicit_path {
            return Ok((Self::load(path)?, path.to_path_buf()));
        }

        let candidates = config_search_paths();
        for candidate in &candidates {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Ok((Self::load(candidate)?, candidate.clone()));
            }
        }

        Err(BrokerError::config(format!(
            "No config file found. Searched: {}",
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )))
    }

    fn validate(&self) -> Result<()> {
        for model in &self.models {
            if model.alias.is_empty() {
                return Err(BrokerError::config("model alias must not be empty"));
            }
            if model.target.url.trim().is_empty() {
                return Err(BrokerError::config(format!(
                    "model '{}' has an empty target url",
                    model.alias
                )));
            }
        }
        Ok(())
    }

    /// Resolve keys and build the registry. Duplicate aliases are rejected here.
    pub fn to_registry(&self) -> Result<ModelRegistry> {
        ModelRegistry::new(self.models.iter().map(|m| Model {
            alias: m.alias.clone(),
            protocol: m.protocol,
            target: Target {
                url: m.target.url.clone(),
                model: m.target.model.clone(),
                api_key: resolve_api_key(&m.alias, &m.target.api_key),
                chat_path: m.target.chat_path.clone(),
            },
        }))
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[must_use]
    pub fn log_filter(&self) -> String {
        format!("lm_broker={0},tower_http={0}", self.log_level)
    }
}

/// `env:VAR` reads the variable; an unset variable yields an empty key.
fn resolve_api_key(alias: &str, raw: &str) -> String {
    match raw.strip_prefix(ENV_PREFIX) {
        Some(var) => std::env::var(var).unwrap_or_else(|_| {
            tracing::warn!(alias, var, "API key variable not set; sending no credentials");
            String::new()
        }),
        None => raw.to_string(),
    }
}

pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("lm-broker.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("lm-broker").join("config.toml"));
    }
    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("lm-broker").join("config.toml"));
        paths.push(home.join(".lm-broker.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(
            f,
            r#"
log_level = "debug"

[server]
port = 9000

[[models]]
alias = "gpt-4"
type = "openai"
[models.target]
url = "https://api.openai.com/v1/"
model = "gpt-4"
api_key = "sk-literal"

[[models]]
alias = "claude"
type = "anthropic"
[models.target]
url = "https://api.anthropic.com/v1"
model = "claude-3-5-sonnet-latest"
chat_path = "messages"
"#
        )
        .unwrap();

        let config = BrokerConfig::load(f.path()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.timeout_secs, 300);
        assert_eq!(config.models.len(), 2);
        assert_eq!(config.models[1].protocol, ProtocolType::Anthropic);
        assert_eq!(config.models[1].target.chat_path.as_deref(), Some("messages"));

        let registry = config.to_registry().unwrap();
        let gpt = registry.lookup("gpt-4").unwrap();
        assert_eq!(gpt.target.api_key, "sk-literal");
        assert_eq!(registry.lookup("claude").unwrap().target.api_key, "");
    }

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::parse("").unwrap();
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.log_level, "info");
        assert!(config.models.is_empty());
        assert_eq!(config.log_filter(), "lm_broker=info,tower_http=info");
    }

    #[test]
    fn test_env_api_key() {
        std::env::set_var("LM_BROKER_TEST_KEY_SET", "sk-from-env");
        std::env::remove_var("LM_BROKER_TEST_KEY_UNSET");
        assert_eq!(resolve_api_key("a", "env:LM_BROKER_TEST_KEY_SET"), "sk-from-env");
        assert_eq!(resolve_api_key("a", "env:LM_BROKER_TEST_KEY_UNSET"), "");
        assert_eq!(resolve_api_key("a", "plain"), "plain");
    }

    #[test]
    fn test_duplicate_alias_is_config_error() {
        let config = BrokerConfig::parse(
            r#"
[[models]]
alias = "m"
type = "openai"
target = { url = "http://a/v1", model = "x" }

[[models]]
alias = "m"
type = "anthropic"
target = { url = "http://b/v1", model = "y" }
"#,
        )
        .unwrap();
        assert!(matches!(
            config.to_registry(),
            Err(BrokerError::Config { .. })
        ));
    }

    #[test]
    fn test_empty_url_rejected() {
        let err = BrokerConfig::parse(
            r#"
[[models]]
alias = "m"
type = "openai"
target = { url = "", model = "x" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BrokerError::Config { .. }));
    }

    #[test]
    fn test_unknown_protocol_rejected() {
        let err = BrokerConfig::parse(
            r#"
[[models]]
alias = "m"
type = "gemini"
target = { url = "http://a", model = "x" }
"#,
        )
        .unwrap_err();
        assert!(matches!(err, BrokerError::Toml(_)));
    }

    #[test]
    fn test_search_paths_start_in_cwd() {
        let paths = config_search_paths();
        assert_eq!(paths[0], PathBuf::from("lm-broker.toml"));
    }
}
