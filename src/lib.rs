//! Amazon Bedrock adapter for chat generation and embeddings
//!
//! Translates provider-independent conversations into the two Claude wire
//! protocol generations hosted on Bedrock, and computes Titan embeddings for
//! many inputs with a bounded, fail-fast worker pool.

pub mod ai;
pub mod config;
pub mod error;
pub mod models;

pub use config::LlmConfig;
pub use error::{Error, Result};
