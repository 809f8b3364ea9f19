//! Bedrock model integration
//!
//! Translates conversations into the Bedrock wire protocols, invokes models
//! through a [`ModelInvoker`] port and computes embedding batches.

pub mod bedrock;
pub mod client;
pub mod embedding;
pub mod fetch;
pub mod mime;
pub mod mock;
pub mod protocol;

pub use bedrock::BedrockInvoker;
pub use client::BedrockLlm;
pub use embedding::EmbeddingDispatcher;
pub use fetch::HttpImageFetcher;
pub use mock::{MockImageFetcher, MockInvoker};
pub use protocol::{ChatProtocol, ProtocolKind, ProtocolRegistry};

use crate::Result;
use async_trait::async_trait;

/// Sends a serialized request body to a model and returns the raw response
/// body.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>>;
}

/// Image bytes plus the media type detected for them.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Resolves remote image URLs while a request is being built.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage>;
}
