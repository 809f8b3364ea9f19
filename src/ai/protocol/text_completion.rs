//! Legacy text-completion protocol (Claude v2 / Instant).
//!
//! One flattened prompt with `Human:` / `Assistant:` turn markers in, one
//! completion string out.

use super::{non_zero_f64, non_zero_u32, ChatProtocol, AI_PROMPT, HUMAN_PROMPT};
use crate::ai::ImageFetcher;
use crate::models::{ContentPart, ConversationMessage, NormalizedResult, ResolvedParameters};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCompletionRequest {
    pub prompt: String,
    pub max_tokens_to_sample: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextCompletionResponse {
    pub completion: String,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

pub struct TextCompletionProtocol;

impl TextCompletionProtocol {
    /// Extract the single text part this protocol accepts.
    fn single_prompt(messages: &[ConversationMessage]) -> Result<&str> {
        let [message] = messages else {
            return Err(Error::Validation("only one message is supported".to_string()));
        };
        let [part] = message.parts.as_slice() else {
            return Err(Error::Validation("only one part is supported".to_string()));
        };
        match part {
            ContentPart::Text(text) => Ok(text.as_str()),
            other => Err(Error::Validation(format!(
                "only text content is supported (got {})",
                other.kind()
            ))),
        }
    }

    pub fn build_payload(
        messages: &[ConversationMessage],
        params: &ResolvedParameters,
    ) -> Result<TextCompletionRequest> {
        let prompt = with_turn_markers(Self::single_prompt(messages)?);

        Ok(TextCompletionRequest {
            prompt,
            max_tokens_to_sample: params.max_tokens,
            temperature: non_zero_f64(params.temperature),
            top_p: non_zero_f64(params.top_p),
            top_k: non_zero_u32(params.top_k),
            stop_sequences: params.stop_sequences.clone(),
        })
    }
}

/// Add the human and assistant turn markers when the prompt lacks them.
pub fn with_turn_markers(text: &str) -> String {
    let mut prompt = if text.contains(HUMAN_PROMPT) {
        text.to_string()
    } else {
        format!("{}{}", HUMAN_PROMPT, text)
    };
    if !prompt.contains(AI_PROMPT) {
        prompt.push_str(AI_PROMPT);
    }
    prompt
}

#[async_trait]
impl ChatProtocol for TextCompletionProtocol {
    async fn build_request(
        &self,
        messages: &[ConversationMessage],
        params: &ResolvedParameters,
        _images: &dyn ImageFetcher,
    ) -> Result<Vec<u8>> {
        let payload = Self::build_payload(messages, params)?;
        tracing::debug!(?payload, "generate content with text-completion protocol");
        serde_json::to_vec(&payload).map_err(Error::serialize)
    }

    fn parse_response(&self, model_id: &str, body: &[u8]) -> Result<NormalizedResult> {
        let response: TextCompletionResponse =
            serde_json::from_slice(body).map_err(Error::deserialize)?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("model".to_string(), model_id.into());

        Ok(NormalizedResult {
            content: response.completion,
            stop_reason: response.stop_reason,
            metadata,
        })
    }
}
