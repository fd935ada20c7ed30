//! chorus-core - The session, routing and fan-out core of the chorus gateway
//!
//! This crate provides:
//! - Provider-agnostic chat message types
//! - An in-memory, task-safe session store behind the [`SessionStore`] trait
//! - Keyword-based routing of conversations to a backend
//! - OpenRouter-backed connectors and the registry that holds them
//! - The orchestrator serving single-model and broadcast chat

pub mod connectors;
pub mod error;
pub mod orchestrator;
pub mod router;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use connectors::{Connector, ConnectorKind, ConnectorRegistry, ConnectorSettings};
pub use error::{ChatError, ProviderError, RegistryError};
pub use orchestrator::{BroadcastReply, ChatReply, ModelOutcome, Orchestrator, OrchestratorConfig};
pub use router::route;
pub use session::{InMemorySessionStore, SessionStore};
pub use types::{Message, Role};
