//! Error taxonomy for connectors, the registry and the orchestrator

use thiserror::Error;

/// Failure reported by a backend connector
///
/// `status` carries the upstream HTTP status when there was one; transport
/// and decoding failures leave it empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", render_provider_error(.status, .message))]
pub struct ProviderError {
    pub status: Option<u16>,
    pub message: String,
}

fn render_provider_error(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("provider returned status {}: {}", code, message),
        None => message.to_string(),
    }
}

impl ProviderError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Failure with no upstream status (network, decoding, timeout)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }
}

/// Errors surfaced by the orchestrator to its callers
#[derive(Debug, Error)]
pub enum ChatError {
    /// Requested or routed model is not in the active registry
    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// The request itself is malformed (e.g. empty model list)
    #[error("{0}")]
    InvalidRequest(String),

    /// The backend call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ChatError {
    /// Whether the failure is the caller's fault (maps to a 4xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedModel(_) | Self::InvalidRequest(_))
    }
}

/// Errors building the connector registry at startup
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
