//! Chat orchestration
//!
//! Serves the two request shapes the gateway exposes: single-model chat,
//! which routes one conversation to one backend, and broadcast chat, which
//! fans the same conversation out to several backends at once and reports
//! each backend's outcome separately.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::connectors::{Connector, ConnectorRegistry};
use crate::error::{ChatError, ProviderError};
use crate::router::route;
use crate::session::SessionStore;
use crate::types::Message;

/// Configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on simultaneous backend calls within one broadcast.
    /// Never below the number of registered connectors, so one slow model
    /// cannot hold back another in the same broadcast.
    pub max_concurrent_calls: usize,
    /// Bound on a single backend call; `None` leaves it to the HTTP client
    pub call_timeout: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: 8,
            call_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Result of a single-model chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatReply {
    pub session_id: String,
    pub model: String,
    pub reply: String,
}

/// Outcome of one model within a broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ModelOutcome {
    Reply { reply: String },
    Error { error: String },
}

impl ModelOutcome {
    fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Self::Reply { .. })
    }
}

/// Result of a broadcast chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BroadcastReply {
    pub session_id: String,
    pub responses: BTreeMap<String, ModelOutcome>,
}

/// Composes the session store, router and connectors
pub struct Orchestrator {
    sessions: Arc<dyn SessionStore>,
    connectors: Arc<ConnectorRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        connectors: Arc<ConnectorRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            sessions,
            connectors,
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn connectors(&self) -> &ConnectorRegistry {
        &self.connectors
    }

    /// Permits for one broadcast; every distinct registered model gets a slot
    fn call_slots(&self) -> usize {
        self.config
            .max_concurrent_calls
            .max(self.connectors.len())
            .max(1)
    }

    /// Send a conversation to one model.
    ///
    /// `model` picks the connector explicitly; when it is absent or blank the
    /// router chooses from the new messages. The session is only updated
    /// after the backend replies.
    pub async fn chat(
        &self,
        model: Option<&str>,
        messages: Vec<Message>,
        session_id: Option<String>,
    ) -> Result<ChatReply, ChatError> {
        let session_id = resolve_session_id(session_id);
        let model_name = match model.map(str::trim).filter(|m| !m.is_empty()) {
            Some(m) => m.to_string(),
            None => route(&messages).to_string(),
        };

        let connector = self
            .connectors
            .get(&model_name)
            .ok_or_else(|| ChatError::UnsupportedModel(model_name.clone()))?;

        let mut full = self.sessions.get(&session_id).await;
        debug!(
            "Chat session={} model={} history={} new={}",
            session_id,
            model_name,
            full.len(),
            messages.len()
        );
        full.extend(messages.iter().cloned());

        let reply =
            match call_connector(connector.as_ref(), &full, &session_id, self.config.call_timeout)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!("Error from {}: {}", model_name, e);
                    return Err(e.into());
                }
            };

        let mut turn = messages;
        turn.push(Message::assistant(reply.clone()));
        self.sessions.append(&session_id, turn).await;

        Ok(ChatReply {
            session_id,
            model: model_name,
            reply,
        })
    }

    /// Send the same conversation to several models concurrently.
    ///
    /// Every model starts from the same history snapshot, so models in one
    /// broadcast never see each other's replies. Each successful model
    /// appends its own turn to the session. Failures, unknown models and
    /// crashed calls become error entries; they never fail the batch.
    pub async fn broadcast(
        &self,
        models: Vec<String>,
        messages: Vec<Message>,
        session_id: Option<String>,
    ) -> Result<BroadcastReply, ChatError> {
        if models.is_empty() {
            return Err(ChatError::InvalidRequest(
                "No target models provided".to_string(),
            ));
        }

        let session_id = resolve_session_id(session_id);
        let history = Arc::new(self.sessions.get(&session_id).await);
        let messages = Arc::new(messages);
        let semaphore = Arc::new(Semaphore::new(self.call_slots()));

        let mut responses = BTreeMap::new();
        let mut handles = Vec::new();
        let mut seen = HashSet::new();

        for model in models {
            if !seen.insert(model.clone()) {
                continue;
            }
            let Some(connector) = self.connectors.get(&model) else {
                warn!("Broadcast requested unsupported model {}", model);
                responses.insert(model, ModelOutcome::error("Unsupported model"));
                continue;
            };

            let call = ModelCall {
                connector,
                sessions: self.sessions.clone(),
                history: history.clone(),
                messages: messages.clone(),
                session_id: session_id.clone(),
                timeout: self.config.call_timeout,
                semaphore: semaphore.clone(),
            };
            handles.push((model, tokio::spawn(call.run())));
        }

        info!(
            "Broadcast session={} to {} model(s)",
            session_id,
            handles.len()
        );

        for (model, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Call to {} did not complete: {}", model, e);
                    ModelOutcome::error(format!("Call to {} failed unexpectedly", model))
                }
            };
            responses.insert(model, outcome);
        }

        Ok(BroadcastReply {
            session_id,
            responses,
        })
    }
}

/// One model's share of a broadcast, owned by its spawned task
struct ModelCall {
    connector: Arc<dyn Connector>,
    sessions: Arc<dyn SessionStore>,
    history: Arc<Vec<Message>>,
    messages: Arc<Vec<Message>>,
    session_id: String,
    timeout: Option<Duration>,
    semaphore: Arc<Semaphore>,
}

impl ModelCall {
    async fn run(self) -> ModelOutcome {
        let name = self.connector.name().to_string();
        let Ok(_permit) = self.semaphore.acquire_owned().await else {
            return ModelOutcome::error("call slots closed");
        };

        let mut full = Vec::with_capacity(self.history.len() + self.messages.len());
        full.extend(self.history.iter().cloned());
        full.extend(self.messages.iter().cloned());

        match call_connector(self.connector.as_ref(), &full, &self.session_id, self.timeout).await {
            Ok(reply) => {
                let mut turn = self.messages.as_ref().clone();
                turn.push(Message::assistant(reply.clone()));
                self.sessions.append(&self.session_id, turn).await;
                debug!("Broadcast reply from {}", name);
                ModelOutcome::Reply { reply }
            }
            Err(e) => {
                warn!("Error from {}: {}", name, e);
                ModelOutcome::error(e.to_string())
            }
        }
    }
}

async fn call_connector(
    connector: &dyn Connector,
    history: &[Message],
    session_id: &str,
    timeout: Option<Duration>,
) -> Result<String, ProviderError> {
    let call = connector.chat(history, Some(session_id));
    match timeout {
        Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
            Err(ProviderError::transport(format!(
                "{} request timed out after {:?}",
                connector.name(),
                limit
            )))
        }),
        None => call.await,
    }
}

fn resolve_session_id(session_id: Option<String>) -> String {
    session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}
