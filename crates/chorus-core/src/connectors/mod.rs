//! Backend connectors
//!
//! Each connector wraps one LLM backend behind the [`Connector`] trait. The
//! set of backends is fixed ([`ConnectorKind`]); which of them are live is
//! decided once at startup by [`ConnectorRegistry::from_settings`], which
//! skips any backend without a credential.

pub mod openrouter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::error::{ProviderError, RegistryError};
use crate::types::Message;

pub use openrouter::OpenRouterConnector;

/// Default OpenRouter chat completions endpoint
pub const DEFAULT_ENDPOINT: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Trait that all backend connectors implement
#[async_trait]
pub trait Connector: Send + Sync {
    /// Registry name (e.g. "qwen")
    fn name(&self) -> &str;

    /// Upstream model identifier (e.g. "qwen/qwen3-coder:free")
    fn model(&self) -> &str;

    /// Send the full ordered history and return the reply text.
    ///
    /// `session_hint` is an opaque correlation token; backends that have no
    /// use for it ignore it.
    async fn chat(
        &self,
        history: &[Message],
        session_hint: Option<&str>,
    ) -> Result<String, ProviderError>;
}

/// The fixed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConnectorKind {
    DeepSeek,
    Mistral,
    Qwen,
}

impl ConnectorKind {
    pub const ALL: [ConnectorKind; 3] = [Self::DeepSeek, Self::Mistral, Self::Qwen];

    /// Name used in requests and as the registry key
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::Mistral => "mistral",
            Self::Qwen => "qwen",
        }
    }

    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DeepSeek",
            Self::Mistral => "Mistral",
            Self::Qwen => "Qwen",
        }
    }

    pub const fn description(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DeepSeek R1",
            Self::Mistral => "Mistral Small 3.2",
            Self::Qwen => "Qwen3 Coder",
        }
    }

    pub const fn default_model(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek/deepseek-r1:free",
            Self::Mistral => "mistralai/mistral-small-3.2-24b-instruct:free",
            Self::Qwen => "qwen/qwen3-coder:free",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl std::fmt::Display for ConnectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable construction parameters for one connector
#[derive(Clone)]
pub struct ConnectorSettings {
    pub kind: ConnectorKind,
    pub api_key: String,
    pub model: String,
    pub url: String,
}

impl std::fmt::Debug for ConnectorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorSettings")
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("url", &self.url)
            .field("has_api_key", &!self.api_key.is_empty())
            .finish()
    }
}

impl ConnectorSettings {
    /// Settings with the kind's default model and the OpenRouter endpoint
    pub fn new(kind: ConnectorKind, api_key: impl Into<String>) -> Self {
        Self {
            kind,
            api_key: api_key.into(),
            model: kind.default_model().to_string(),
            url: DEFAULT_ENDPOINT.to_string(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// A connector without a credential is unavailable
    pub fn is_available(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

/// Name → connector lookup, built once at startup
#[derive(Default, Clone)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build live connectors from settings, skipping any without a credential
    pub fn from_settings(
        settings: Vec<ConnectorSettings>,
        request_timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        let mut registry = Self::new();

        for s in settings {
            if !s.is_available() {
                warn!(
                    "API key for {} not found; skipping connector initialization",
                    s.kind
                );
                continue;
            }
            registry.register(Arc::new(OpenRouterConnector::new(client.clone(), s)));
        }

        if registry.is_empty() {
            error!("No LLM connectors available. Check provider API keys in the config.");
        } else {
            info!("Active connectors: {}", registry.names().join(", "));
        }

        Ok(registry)
    }

    /// Register a connector under its own name, replacing any previous one
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        self.connectors
            .insert(connector.name().to_string(), connector);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered connectors, sorted by name
    pub fn connectors(&self) -> Vec<Arc<dyn Connector>> {
        let mut list: Vec<Arc<dyn Connector>> = self.connectors.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}
