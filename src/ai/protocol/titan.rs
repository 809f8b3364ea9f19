//! Titan text embedding protocol: one input text per invocation.

use crate::models::model_id;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TitanEmbeddingRequest<'a> {
    #[serde(rename = "inputText")]
    pub input_text: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TitanEmbeddingResponse {
    pub embedding: Vec<f64>,
    #[serde(rename = "inputTextTokenCount", default)]
    pub input_text_token_count: u32,
}

/// Whether `model` speaks this protocol.
pub fn supports(model: &str) -> bool {
    model == model_id::TITAN_EMBEDDING_G1_TEXT
}

pub fn build_request(text: &str) -> Result<Vec<u8>> {
    serde_json::to_vec(&TitanEmbeddingRequest { input_text: text }).map_err(Error::serialize)
}

/// Decode a response into an `f32` vector plus the input token count.
pub fn parse_response(body: &[u8]) -> Result<(Vec<f32>, u32)> {
    let response: TitanEmbeddingResponse =
        serde_json::from_slice(body).map_err(Error::deserialize)?;
    let embedding = response.embedding.into_iter().map(|v| v as f32).collect();
    Ok((embedding, response.input_text_token_count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request() {
        let body = build_request("this is a pen").unwrap();
        assert_eq!(body, br#"{"inputText":"this is a pen"}"#);
    }

    #[test]
    fn test_parse_response() {
        let (embedding, tokens) =
            parse_response(br#"{"embedding":[0.25,-1.5,3.0],"inputTextTokenCount":4}"#).unwrap();
        assert_eq!(embedding, vec![0.25f32, -1.5, 3.0]);
        assert_eq!(tokens, 4);
    }

    #[test]
    fn test_parse_response_missing_embedding() {
        let err = parse_response(br#"{"inputTextTokenCount":4}"#).unwrap_err();
        assert!(matches!(err, Error::Translation { .. }));
    }

    #[test]
    fn test_supports_titan_only() {
        assert!(supports(model_id::TITAN_EMBEDDING_G1_TEXT));
        assert!(!supports("cohere.embed-english-v3"));
    }
}
