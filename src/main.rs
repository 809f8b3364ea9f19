use anyhow::Result;
use bedrock_llm::ai::{BedrockLlm, ProtocolKind};
use bedrock_llm::models::{CallOptions, ConversationMessage, GenerationParameters, Role};
use bedrock_llm::LlmConfig;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "bedrock-llm")]
#[command(about = "Generate text and embeddings with Amazon Bedrock models")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a completion for a prompt.
    Generate {
        /// Model id; defaults to BEDROCK_MODEL or Claude Instant.
        #[arg(long)]
        model: Option<String>,
        /// Optional system prompt sent ahead of the user prompt.
        #[arg(long)]
        system: Option<String>,
        #[arg(long)]
        max_tokens: Option<u32>,
        #[arg(long)]
        temperature: Option<f64>,
        prompt: String,
    },
    /// Embed each argument and print the vectors as JSON.
    Embed {
        #[arg(required = true)]
        texts: Vec<String>,
    },
}

/// Legacy text-completion models take exactly one message, so the system
/// prompt is folded into the human turn ahead of the prompt.
fn build_messages(
    kind: ProtocolKind,
    system: Option<String>,
    prompt: String,
) -> Vec<ConversationMessage> {
    match (kind, system) {
        (ProtocolKind::TextCompletion, Some(system)) => vec![ConversationMessage::text(
            Role::Human,
            format!("{}\n\n{}", system.trim_end(), prompt),
        )],
        (ProtocolKind::Messages, Some(system)) => vec![
            ConversationMessage::text(Role::System, system),
            ConversationMessage::text(Role::Human, prompt),
        ],
        (_, None) => vec![ConversationMessage::text(Role::Human, prompt)],
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = LlmConfig::from_env()?;
    let llm = BedrockLlm::new(config).await?;

    match args.command {
        Command::Generate {
            model,
            system,
            max_tokens,
            temperature,
            prompt,
        } => {
            let kind = ProtocolKind::for_model(model.as_deref().unwrap_or(&llm.config().model))?;
            let options = CallOptions {
                model,
                parameters: GenerationParameters {
                    max_tokens,
                    temperature,
                    ..Default::default()
                },
            };
            let result = llm
                .generate_content(&build_messages(kind, system, prompt), &options)
                .await?;
            if let Some(reason) = &result.stop_reason {
                info!("Stop reason: {}", reason);
            }
            println!("{}", result.content);
        }
        Command::Embed { texts } => {
            let cancel = CancellationToken::new();
            let ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    ctrl_c.cancel();
                }
            });

            let embeddings = llm.create_embedding(&texts, &cancel).await?;
            println!("{}", serde_json::to_string(&embeddings)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bedrock_llm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Request failed: {}", e);
            std::process::exit(1);
        }
    }
}
