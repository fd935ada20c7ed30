use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chorus_core::connectors::DEFAULT_ENDPOINT;
use chorus_core::{ConnectorKind, ConnectorSettings, OrchestratorConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Config written by `chorus init` and used when no file exists yet
pub const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChorusConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Empty allows any origin
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            cors_origins: default_cors_origins(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://localhost:5174".to_string(),
    ]
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Shared OpenRouter key
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub qwen: ModelConfig,
    #[serde(default)]
    pub deepseek: ModelConfig,
    #[serde(default)]
    pub mistral: ModelConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: default_url(),
            request_timeout_secs: default_request_timeout_secs(),
            qwen: ModelConfig::default(),
            deepseek: ModelConfig::default(),
            mistral: ModelConfig::default(),
        }
    }
}

impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("url", &self.url)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("qwen", &self.qwen)
            .field("deepseek", &self.deepseek)
            .field("mistral", &self.mistral)
            .finish()
    }
}

fn default_url() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

/// Per-connector overrides
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Upstream model identifier; empty means the connector's default
    #[serde(default)]
    pub model: String,
    /// Overrides the shared key for this connector only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_deref().map(mask_secret))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// 0 disables the per-call timeout
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent_calls(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_max_concurrent_calls() -> usize {
    8
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".chorus")
}

impl ChorusConfig {
    /// Load from `custom_path`, or from `~/.chorus/config.toml`.
    ///
    /// A missing file at the default location falls back to the bundled
    /// default config; a missing explicit path is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from(path),
            None => {
                let path = config_dir().join("config.toml");
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    debug!(
                        "No config at {}, using bundled defaults",
                        path.display()
                    );
                    Self::parse(DEFAULT_CONFIG, "bundled default config")
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `chorus init` first.",
                path.display()
            )
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", origin))?;

        if config.providers.api_key.starts_with("sk-or-") {
            warn!(
                "API key is hardcoded in config file. For security, use environment variables: api_key = \"${{OPENROUTER_API_KEY}}\""
            );
        }

        Ok(config)
    }

    /// Socket address to serve on; a blank value uses the default
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let bind = if self.server.bind.trim().is_empty() {
            default_bind()
        } else {
            self.server.bind.trim().to_string()
        };
        bind.parse()
            .with_context(|| format!("Invalid server bind address '{}'", bind))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.providers.request_timeout_secs)
    }

    /// Settings for every supported connector, available or not
    pub fn connector_settings(&self) -> Vec<ConnectorSettings> {
        let url = non_blank(&self.providers.url).unwrap_or(DEFAULT_ENDPOINT);

        ConnectorKind::ALL
            .into_iter()
            .map(|kind| {
                let overrides = self.providers.model_config(kind);
                let api_key = overrides
                    .api_key
                    .as_deref()
                    .and_then(non_blank)
                    .unwrap_or(self.providers.api_key.as_str());
                let model = non_blank(&overrides.model).unwrap_or(kind.default_model());

                ConnectorSettings::new(kind, api_key.trim())
                    .with_model(model)
                    .with_url(url)
            })
            .collect()
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let call_timeout = match self.orchestrator.call_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        OrchestratorConfig {
            max_concurrent_calls: self.orchestrator.max_concurrent_calls.max(1),
            call_timeout,
        }
    }

    /// Copy with every credential masked, for display
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.providers.api_key = mask_secret(&masked.providers.api_key);
        for kind in ConnectorKind::ALL {
            let overrides = masked.providers.model_config_mut(kind);
            if let Some(key) = overrides.api_key.as_mut() {
                *key = mask_secret(key);
            }
        }
        masked
    }
}

impl ProvidersConfig {
    fn model_config(&self, kind: ConnectorKind) -> &ModelConfig {
        match kind {
            ConnectorKind::DeepSeek => &self.deepseek,
            ConnectorKind::Mistral => &self.mistral,
            ConnectorKind::Qwen => &self.qwen,
        }
    }

    fn model_config_mut(&mut self, kind: ConnectorKind) -> &mut ModelConfig {
        match kind {
            ConnectorKind::DeepSeek => &mut self.deepseek,
            ConnectorKind::Mistral => &mut self.mistral,
            ConnectorKind::Qwen => &mut self.qwen,
        }
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[
    "OPENROUTER_API_KEY",
    "OPENROUTER_URL",
    "QWEN_MODEL",
    "DEEPSEEK_MODEL",
    "MISTRAL_MODEL",
    "CHORUS_BIND",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            // Leave the ${VAR} unexpanded so it's obvious
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result.replace_range(abs_start..abs_start + end + 1, &value);
        pos = abs_start + value.len();
    }
    result
}
