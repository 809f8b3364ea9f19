//! Wire protocols spoken by Bedrock-hosted models.
//!
//! Chat models come in two generations: the legacy text-completion protocol
//! (single flattened prompt) and the message protocol (structured turns).
//! Each is a [`ChatProtocol`] strategy registered in a [`ProtocolRegistry`]
//! under its [`ProtocolKind`].

pub mod messages;
pub mod text_completion;
pub mod titan;

pub use messages::MessagesProtocol;
pub use text_completion::TextCompletionProtocol;

use super::ImageFetcher;
use crate::models::{model_id, ConversationMessage, NormalizedResult, ResolvedParameters};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Turn marker opening a human turn in a flattened prompt.
pub const HUMAN_PROMPT: &str = "\n\nHuman:";
/// Turn marker opening an assistant turn in a flattened prompt.
pub const AI_PROMPT: &str = "\n\nAssistant:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// `prompt` / `completion` protocol used by Claude v2 and Instant.
    TextCompletion,
    /// `messages` protocol used by Claude 3.
    Messages,
}

impl ProtocolKind {
    /// Map a model id onto the protocol generation it speaks.
    pub fn for_model(model: &str) -> Result<Self> {
        match model {
            model_id::CLAUDE_V2 | model_id::CLAUDE_INSTANT => Ok(ProtocolKind::TextCompletion),
            m if m.starts_with("anthropic.claude-v2") || m.starts_with("anthropic.claude-instant") => {
                Ok(ProtocolKind::TextCompletion)
            }
            m if m.starts_with("anthropic.claude-3") => Ok(ProtocolKind::Messages),
            other => Err(Error::UnsupportedModel(format!(
                "model `{}` not supported",
                other
            ))),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::TextCompletion => f.write_str("text-completion"),
            ProtocolKind::Messages => f.write_str("messages"),
        }
    }
}

/// Request builder and response parser for one protocol generation.
#[async_trait]
pub trait ChatProtocol: Send + Sync {
    /// Serialize `messages` into a request body. Remote images are resolved
    /// through `images`.
    async fn build_request(
        &self,
        messages: &[ConversationMessage],
        params: &ResolvedParameters,
        images: &dyn ImageFetcher,
    ) -> Result<Vec<u8>>;

    fn parse_response(&self, model_id: &str, body: &[u8]) -> Result<NormalizedResult>;
}

/// Strategy table keyed by protocol kind.
#[derive(Clone)]
pub struct ProtocolRegistry {
    protocols: HashMap<ProtocolKind, Arc<dyn ChatProtocol>>,
}

impl ProtocolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            protocols: HashMap::new(),
        }
    }

    /// A registry with both built-in protocol generations.
    pub fn with_defaults() -> Self {
        Self::new()
            .register(ProtocolKind::TextCompletion, Arc::new(TextCompletionProtocol))
            .register(ProtocolKind::Messages, Arc::new(MessagesProtocol))
    }

    pub fn register(mut self, kind: ProtocolKind, protocol: Arc<dyn ChatProtocol>) -> Self {
        self.protocols.insert(kind, protocol);
        self
    }

    pub fn get(&self, kind: ProtocolKind) -> Result<Arc<dyn ChatProtocol>> {
        self.protocols
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::UnsupportedModel(format!("no protocol registered for {}", kind)))
    }

    /// Resolve the strategy for a model id.
    pub fn for_model(&self, model: &str) -> Result<Arc<dyn ChatProtocol>> {
        self.get(ProtocolKind::for_model(model)?)
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

pub(crate) fn non_zero_f64(value: f64) -> Option<f64> {
    (value != 0.0).then_some(value)
}

pub(crate) fn non_zero_u32(value: u32) -> Option<u32> {
    (value != 0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_known_models() {
        assert_eq!(
            ProtocolKind::for_model(model_id::CLAUDE_V2).unwrap(),
            ProtocolKind::TextCompletion
        );
        assert_eq!(
            ProtocolKind::for_model(model_id::CLAUDE_INSTANT).unwrap(),
            ProtocolKind::TextCompletion
        );
        assert_eq!(
            ProtocolKind::for_model(model_id::CLAUDE_3_SONNET).unwrap(),
            ProtocolKind::Messages
        );
        assert_eq!(
            ProtocolKind::for_model(model_id::CLAUDE_3_HAIKU).unwrap(),
            ProtocolKind::Messages
        );
    }

    #[test]
    fn test_kind_for_unknown_model() {
        let err = ProtocolKind::for_model("meta.llama2-13b-chat-v1").unwrap_err();
        assert!(matches!(err, Error::UnsupportedModel(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_empty_registry_reports_missing_protocol() {
        let registry = ProtocolRegistry::new();
        let err = registry.for_model(model_id::CLAUDE_V2).err().unwrap();
        assert!(err.to_string().contains("text-completion"));
    }

    #[test]
    fn test_default_registry_resolves_both_generations() {
        let registry = ProtocolRegistry::default();
        assert!(registry.for_model(model_id::CLAUDE_V2).is_ok());
        assert!(registry.for_model(model_id::CLAUDE_3_HAIKU).is_ok());
    }
}
