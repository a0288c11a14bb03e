//! Backend seam between the orchestrator and the model-server transport

use async_trait::async_trait;
use ember_llm::{ChunkStream, GenerateRequest, GenerateResponse, OllamaClient};

use crate::cancel::CancellationSignal;
use crate::error::Result;

/// Transport contract consumed by the orchestrator.
///
/// The signal is advisory: implementations poll it once per received
/// fragment and stop producing when it is set.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a stream of generation fragments
    async fn stream(
        &self,
        request: &GenerateRequest,
        signal: CancellationSignal,
    ) -> Result<ChunkStream>;

    /// Issue one blocking generation call
    async fn generate(
        &self,
        request: &GenerateRequest,
        signal: CancellationSignal,
    ) -> Result<GenerateResponse>;
}

#[async_trait]
impl Backend for OllamaClient {
    async fn stream(
        &self,
        request: &GenerateRequest,
        signal: CancellationSignal,
    ) -> Result<ChunkStream> {
        Ok(OllamaClient::stream(self, request, signal.probe()).await?)
    }

    async fn generate(
        &self,
        request: &GenerateRequest,
        signal: CancellationSignal,
    ) -> Result<GenerateResponse> {
        Ok(OllamaClient::generate(self, request, signal.probe()).await?)
    }
}
