//! Keyword routing
//!
//! Picks a backend for a conversation when the caller did not name one.
//! Rules are checked in order and the first match wins; anything that
//! matches nothing goes to the general-purpose default.

use tracing::debug;

use crate::connectors::ConnectorKind;
use crate::types::Message;

/// Ordered routing table: (keywords, target)
const RULES: &[(&[&str], ConnectorKind)] = &[
    (&["code", "program", "python", "javascript"], ConnectorKind::Qwen),
    (&["research", "study", "knowledge", "paper"], ConnectorKind::DeepSeek),
];

const DEFAULT_ROUTE: ConnectorKind = ConnectorKind::Mistral;

/// Route a conversation to a connector name.
///
/// Matching is case-insensitive substring search over all message contents
/// joined by a space, so "decode" counts as "code".
pub fn route(messages: &[Message]) -> &'static str {
    classify(messages).name()
}

fn classify(messages: &[Message]) -> ConnectorKind {
    let text = messages
        .iter()
        .map(|m| m.content.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    let kind = RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, kind)| *kind)
        .unwrap_or(DEFAULT_ROUTE);

    debug!("Routed {} message(s) to {}", messages.len(), kind.name());
    kind
}
