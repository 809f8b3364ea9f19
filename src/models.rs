//! Conversation, parameter and result models shared by every protocol.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bedrock model identifiers.
///
/// See <https://docs.aws.amazon.com/bedrock/latest/userguide/model-ids-arns.html>.
pub mod model_id {
    pub const TITAN_EMBEDDING_G1_TEXT: &str = "amazon.titan-embed-text-v1";
    pub const CLAUDE_V2: &str = "anthropic.claude-v2:1";
    pub const CLAUDE_INSTANT: &str = "anthropic.claude-instant-v1";
    pub const CLAUDE_3_SONNET: &str = "anthropic.claude-3-sonnet-20240229-v1:0";
    pub const CLAUDE_3_HAIKU: &str = "anthropic.claude-3-haiku-20240307-v1:0";
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Human,
    Ai,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Human => "human",
            Role::Ai => "ai",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "human" | "user" => Ok(Role::Human),
            "ai" | "assistant" => Ok(Role::Ai),
            "system" => Ok(Role::System),
            other => Err(Error::Validation(format!("unsupported role: {}", other))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// One unit of a message payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// Image referenced by URL; fetched when the request is built.
    RemoteImage { url: String },
    /// Image bytes supplied by the caller with their declared media type.
    InlineImage { mime_type: String, data: Vec<u8> },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }

    pub fn remote_image(url: impl Into<String>) -> Self {
        ContentPart::RemoteImage { url: url.into() }
    }

    pub fn inline_image(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        ContentPart::InlineImage {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Short name of the part kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ContentPart::Text(_) => "text",
            ContentPart::RemoteImage { .. } => "remote image",
            ContentPart::InlineImage { .. } => "inline image",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl ConversationMessage {
    pub fn new(role: Role, parts: Vec<ContentPart>) -> Self {
        Self { role, parts }
    }

    /// A message made of a single text part.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ContentPart::text(text)])
    }
}

/// Per-call sampling parameters. Absent or zero values fall back to the
/// instance defaults in [`GenerationParameters::resolve`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParameters {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Parameters after defaulting; what the wire requests are built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedParameters {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub stop_sequences: Vec<String>,
}

impl Default for ResolvedParameters {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 50,
            stop_sequences: vec!["Human:".to_string()],
        }
    }
}

impl GenerationParameters {
    pub fn resolve(&self, defaults: &ResolvedParameters) -> ResolvedParameters {
        ResolvedParameters {
            max_tokens: self
                .max_tokens
                .filter(|v| *v != 0)
                .unwrap_or(defaults.max_tokens),
            temperature: self
                .temperature
                .filter(|v| *v != 0.0)
                .unwrap_or(defaults.temperature),
            top_p: self.top_p.filter(|v| *v != 0.0).unwrap_or(defaults.top_p),
            top_k: self.top_k.filter(|v| *v != 0).unwrap_or(defaults.top_k),
            stop_sequences: self
                .stop_sequences
                .clone()
                .unwrap_or_else(|| defaults.stop_sequences.clone()),
        }
    }
}

/// Options for a single generation call.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the configured chat model for this call.
    pub model: Option<String>,
    pub parameters: GenerationParameters,
}

impl CallOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_parameters(mut self, parameters: GenerationParameters) -> Self {
        self.parameters = parameters;
        self
    }
}

/// Provider-independent generation result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub content: String,
    pub stop_reason: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// One unit of work for the embedding dispatcher.
#[derive(Debug, Clone)]
pub struct EmbeddingJob {
    pub index: usize,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parsing() {
        assert_eq!("human".parse::<Role>().unwrap(), Role::Human);
        assert_eq!("AI".parse::<Role>().unwrap(), Role::Ai);
        assert_eq!("system".parse::<Role>().unwrap(), Role::System);

        let err = "tool".parse::<Role>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Ai).unwrap();
        assert_eq!(json, "\"ai\"");

        assert!(serde_json::from_str::<Role>("\"function\"").is_err());
    }

    #[test]
    fn test_resolve_falls_back_on_absent_and_zero() {
        let defaults = ResolvedParameters::default();
        let params = GenerationParameters {
            max_tokens: Some(0),
            temperature: Some(0.2),
            top_p: None,
            top_k: Some(5),
            stop_sequences: None,
        };

        let resolved = params.resolve(&defaults);
        assert_eq!(resolved.max_tokens, 1000);
        assert_eq!(resolved.temperature, 0.2);
        assert_eq!(resolved.top_p, 0.9);
        assert_eq!(resolved.top_k, 5);
        assert_eq!(resolved.stop_sequences, vec!["Human:".to_string()]);
    }

    #[test]
    fn test_resolve_keeps_explicit_empty_stop_sequences() {
        let params = GenerationParameters {
            stop_sequences: Some(Vec::new()),
            ..Default::default()
        };

        let resolved = params.resolve(&ResolvedParameters::default());
        assert!(resolved.stop_sequences.is_empty());
    }
}
