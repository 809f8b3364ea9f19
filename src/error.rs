//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed input shape: message/part counts, roles, content kinds.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported model: {0}")]
    UnsupportedModel(String),

    /// Request or response payload could not be (de)serialized.
    #[error("Translation error (failed to {stage}): {source}")]
    Translation {
        stage: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The invocation port or the image-fetch port failed.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// First failure observed in an embedding batch.
    #[error("failed to create embedding for text {index}: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn serialize(source: serde_json::Error) -> Self {
        Error::Translation {
            stage: "marshal payload",
            source,
        }
    }

    pub(crate) fn deserialize(source: serde_json::Error) -> Self {
        Error::Translation {
            stage: "unmarshal response",
            source,
        }
    }

    /// True for input-shape errors raised before any network call.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::UnsupportedModel(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
