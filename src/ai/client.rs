use super::embedding::EmbeddingDispatcher;
use super::fetch::HttpImageFetcher;
use super::protocol::ProtocolRegistry;
use super::{BedrockInvoker, ImageFetcher, ModelInvoker};
use crate::config::LlmConfig;
use crate::models::{CallOptions, ConversationMessage, NormalizedResult, Role};
use crate::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Chat generation and embeddings against Bedrock-hosted models.
pub struct BedrockLlm {
    invoker: Arc<dyn ModelInvoker>,
    images: Arc<dyn ImageFetcher>,
    registry: ProtocolRegistry,
    config: LlmConfig,
}

impl BedrockLlm {
    /// Build a client backed by the Bedrock runtime using the default AWS
    /// credential chain.
    pub async fn new(config: LlmConfig) -> Result<Self> {
        config.validate()?;
        let invoker = BedrockInvoker::new(config.region.clone()).await;
        Ok(Self::with_services(
            config,
            Arc::new(invoker),
            Arc::new(HttpImageFetcher::default()),
        ))
    }

    /// Build a client from explicit ports.
    ///
    /// This is primarily useful for tests and harnesses that need to inject
    /// mocks.
    pub fn with_services(
        config: LlmConfig,
        invoker: Arc<dyn ModelInvoker>,
        images: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            invoker,
            images,
            registry: ProtocolRegistry::with_defaults(),
            config,
        }
    }

    /// Replace the protocol registry, e.g. to add a protocol generation.
    pub fn with_registry(mut self, registry: ProtocolRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub async fn generate_content(
        &self,
        messages: &[ConversationMessage],
        options: &CallOptions,
    ) -> Result<NormalizedResult> {
        let model = options.model.as_deref().unwrap_or(&self.config.model);
        tracing::debug!(model, messages = messages.len(), "generate content called");

        let protocol = self.registry.for_model(model)?;
        let params = options.parameters.resolve(&self.config.defaults);

        let body = protocol
            .build_request(messages, &params, self.images.as_ref())
            .await?;
        let response = self.invoker.invoke(model, body).await?;
        protocol.parse_response(model, &response)
    }

    /// Generate from a single human prompt and return only the text.
    pub async fn call(&self, prompt: &str, options: &CallOptions) -> Result<String> {
        let messages = [ConversationMessage::text(Role::Human, prompt)];
        Ok(self.generate_content(&messages, options).await?.content)
    }

    /// Embed every text with the configured embedding model, preserving
    /// input order.
    pub async fn create_embedding<T: AsRef<str>>(
        &self,
        texts: &[T],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        tracing::debug!(texts = texts.len(), "create embedding called");
        let dispatcher = EmbeddingDispatcher::new(
            self.invoker.clone(),
            self.config.embedding_model.clone(),
            self.config.num_workers,
        )?;
        dispatcher.embed(texts, cancel).await
    }
}
