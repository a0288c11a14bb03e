//! ember-llm: NDJSON streaming client for local Ollama-compatible model servers
//!
//! This crate provides the typed request/response model and the HTTP transport
//! used by ember-engine to drive token-by-token generation.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{ClientConfig, OllamaClient};
pub use error::{Error, Result};
pub use stream::{ChunkStream, GenerateChunk};
pub use types::*;
