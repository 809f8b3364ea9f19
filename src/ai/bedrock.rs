//! Bedrock runtime implementation of [`ModelInvoker`].

use super::ModelInvoker;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockruntime::config::Region;
use aws_sdk_bedrockruntime::error::DisplayErrorContext;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::Client as BedrockClient;

pub struct BedrockInvoker {
    client: BedrockClient,
}

impl BedrockInvoker {
    /// Build a client from the default AWS credential chain. `region`
    /// overrides the region the chain would pick.
    pub async fn new(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let config = loader.load().await;

        Self {
            client: BedrockClient::new(&config),
        }
    }

    pub fn from_client(client: BedrockClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ModelInvoker for BedrockInvoker {
    async fn invoke(&self, model_id: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        tracing::debug!("Invoking Bedrock model {}", model_id);

        let output = self
            .client
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body))
            .send()
            .await
            .map_err(|e| {
                let detail = DisplayErrorContext(&e);
                tracing::error!("Failed to invoke model {}: {}", model_id, detail);
                Error::Transport(format!("failed to invoke model {}: {}", model_id, detail))
            })?;

        Ok(output.body().as_ref().to_vec())
    }
}
