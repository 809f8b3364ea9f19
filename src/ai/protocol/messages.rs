//! Message protocol (Claude 3).
//!
//! Ordered multi-turn, multi-part messages with an optional top-level system
//! prompt. Responses carry content blocks plus usage metadata.

use super::{non_zero_f64, non_zero_u32, ChatProtocol, AI_PROMPT, HUMAN_PROMPT};
use crate::ai::ImageFetcher;
use crate::models::{
    ContentPart, ConversationMessage, NormalizedResult, ResolvedParameters, Role,
};
use crate::{Error, Result};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

const ROLE_USER: &str = "user";
const ROLE_ASSISTANT: &str = "assistant";
const ROLE_SYSTEM: &str = "system";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesRequest {
    pub anthropic_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: Vec<WireContent>,
}

impl WireMessage {
    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: vec![WireContent::Text { text: text.into() }],
        }
    }

    /// Concatenated text blocks, in order.
    fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                WireContent::Text { text } => Some(text.as_str()),
                WireContent::Image { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireContent {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

impl ImageSource {
    fn base64(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: media_type.into(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesResponse {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub response_type: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub stop_sequence: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub content: Vec<ResponseBlock>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Pieces of a flattened `Human:` / `Assistant:` prompt.
#[derive(Debug, PartialEq)]
struct LegacyPrompt<'a> {
    system: &'a str,
    user: &'a str,
    assistant: Option<&'a str>,
}

/// Split a flattened legacy prompt into system prefix, first human turn and
/// first assistant turn. Returns `None` when there is no human marker.
///
/// Only a single human/assistant pair is recognized; anything after a second
/// assistant marker is dropped.
fn split_legacy_prompt(text: &str) -> Option<LegacyPrompt<'_>> {
    let (system, rest) = text.split_once(HUMAN_PROMPT)?;
    let (user, assistant) = match rest.split_once(AI_PROMPT) {
        Some((user, tail)) => {
            let segment = tail.split_once(AI_PROMPT).map_or(tail, |(seg, _)| seg);
            (user, Some(segment.trim()).filter(|s| !s.is_empty()))
        }
        None => (rest, None),
    };

    Some(LegacyPrompt {
        system: system.trim(),
        user: user.trim(),
        assistant,
    })
}

pub struct MessagesProtocol;

impl MessagesProtocol {
    /// Reject anything this protocol cannot carry before touching the network.
    fn validate(messages: &[ConversationMessage]) -> Result<()> {
        if messages.is_empty() {
            return Err(Error::Validation("no messages".to_string()));
        }
        for message in messages {
            for part in &message.parts {
                if let ContentPart::InlineImage { mime_type, .. } = part {
                    if !mime_type.to_ascii_lowercase().starts_with("image/") {
                        return Err(Error::Validation(format!(
                            "unsupported content type: {}",
                            mime_type
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn wire_role(role: Role) -> &'static str {
        match role {
            Role::Human => ROLE_USER,
            Role::Ai => ROLE_ASSISTANT,
            Role::System => ROLE_SYSTEM,
        }
    }

    async fn convert_part(part: &ContentPart, images: &dyn ImageFetcher) -> Result<WireContent> {
        Ok(match part {
            ContentPart::Text(text) => WireContent::Text { text: text.clone() },
            ContentPart::RemoteImage { url } => {
                let image = images.fetch(url).await?;
                WireContent::Image {
                    source: ImageSource::base64(image.mime_type, &image.data),
                }
            }
            ContentPart::InlineImage { mime_type, data } => WireContent::Image {
                source: ImageSource::base64(mime_type.clone(), data),
            },
        })
    }

    async fn convert_messages(
        messages: &[ConversationMessage],
        images: &dyn ImageFetcher,
    ) -> Result<Vec<WireMessage>> {
        let mut converted = Vec::with_capacity(messages.len());
        for message in messages {
            let mut content = Vec::with_capacity(message.parts.len());
            for part in &message.parts {
                content.push(Self::convert_part(part, images).await?);
            }
            converted.push(WireMessage {
                role: Self::wire_role(message.role).to_string(),
                content,
            });
        }
        Ok(converted)
    }

    /// A lone single-text message holding a flattened `Human:` prompt is
    /// re-expressed as structured turns. Returns the system prefix and the
    /// replacement messages.
    fn rewrite_legacy_prompt(msgs: &[WireMessage]) -> Option<(String, Vec<WireMessage>)> {
        let [WireMessage { content, .. }] = msgs else {
            return None;
        };
        let [WireContent::Text { text }] = content.as_slice() else {
            return None;
        };
        let legacy = split_legacy_prompt(text)?;

        let mut rebuilt = vec![WireMessage::text(ROLE_USER, legacy.user)];
        if let Some(assistant) = legacy.assistant {
            rebuilt.push(WireMessage::text(ROLE_ASSISTANT, assistant));
        }
        Some((legacy.system.to_string(), rebuilt))
    }

    pub async fn build_payload(
        messages: &[ConversationMessage],
        params: &ResolvedParameters,
        images: &dyn ImageFetcher,
    ) -> Result<MessagesRequest> {
        Self::validate(messages)?;
        let mut msgs = Self::convert_messages(messages, images).await?;

        let mut system = String::new();
        if msgs.first().is_some_and(|m| m.role == ROLE_SYSTEM) {
            system = msgs.remove(0).joined_text();
        }

        if let Some((prefix, rebuilt)) = Self::rewrite_legacy_prompt(&msgs) {
            system = format!("{}{}", prefix, system);
            msgs = rebuilt;
        }

        if msgs.is_empty() {
            return Err(Error::Validation("no messages".to_string()));
        }

        Ok(MessagesRequest {
            anthropic_version: ANTHROPIC_VERSION.to_string(),
            temperature: non_zero_f64(params.temperature),
            top_p: non_zero_f64(params.top_p),
            top_k: non_zero_u32(params.top_k),
            stop_sequences: params.stop_sequences.clone(),
            system: Some(system).filter(|s| !s.is_empty()),
            max_tokens: non_zero_u32(params.max_tokens),
            messages: msgs,
        })
    }
}

#[async_trait]
impl ChatProtocol for MessagesProtocol {
    async fn build_request(
        &self,
        messages: &[ConversationMessage],
        params: &ResolvedParameters,
        images: &dyn ImageFetcher,
    ) -> Result<Vec<u8>> {
        let payload = Self::build_payload(messages, params, images).await?;
        let body = serde_json::to_vec(&payload).map_err(Error::serialize)?;
        tracing::debug!(
            payload = %String::from_utf8_lossy(&body),
            "generate content with messages protocol"
        );
        Ok(body)
    }

    fn parse_response(&self, model_id: &str, body: &[u8]) -> Result<NormalizedResult> {
        let response: MessagesResponse =
            serde_json::from_slice(body).map_err(Error::deserialize)?;
        tracing::debug!(
            id = %response.id,
            role = %response.role,
            stop_reason = ?response.stop_reason,
            stop_sequence = ?response.stop_sequence,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "generate content with messages protocol"
        );

        let content: String = response
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        let mut metadata = serde_json::Map::new();
        metadata.insert("id".to_string(), response.id.into());
        metadata.insert("model".to_string(), model_id.into());
        metadata.insert("role".to_string(), response.role.into());
        metadata.insert("type".to_string(), response.response_type.into());
        metadata.insert(
            "stop_sequence".to_string(),
            response.stop_sequence.into(),
        );
        metadata.insert(
            "usage.input_tokens".to_string(),
            response.usage.input_tokens.into(),
        );
        metadata.insert(
            "usage.output_tokens".to_string(),
            response.usage.output_tokens.into(),
        );

        Ok(NormalizedResult {
            content,
            stop_reason: response.stop_reason,
            metadata,
        })
    }
}
