//! Streaming chunk types and NDJSON line decoding

use crate::types::ContinuationToken;
use serde::Deserialize;
use std::pin::Pin;
use tokio_stream::Stream;

/// One fragment of a streaming generation
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateChunk {
    /// Response text carried by this fragment (may be empty)
    #[serde(default)]
    pub response: String,
    /// Whether this is the final fragment
    #[serde(default)]
    pub done: bool,
    /// Continuation token, present on the final fragment
    #[serde(default)]
    pub context: Option<ContinuationToken>,
}

/// A stream of generation fragments
pub type ChunkStream = Pin<Box<dyn Stream<Item = crate::error::Result<GenerateChunk>> + Send>>;

/// Decode a single NDJSON line into a chunk.
///
/// Returns `None` for blank or unparseable lines; a malformed fragment is
/// skipped, it never aborts the stream.
pub fn decode_line(line: &str) -> Option<GenerateChunk> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<GenerateChunk>(line) {
        Ok(chunk) => Some(chunk),
        Err(e) => {
            tracing::debug!("skipping malformed stream line: {}", e);
            None
        }
    }
}
