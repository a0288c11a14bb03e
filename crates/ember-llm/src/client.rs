//! HTTP client for an Ollama-compatible model server

use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::{Error, Result},
    stream::{ChunkStream, decode_line},
    types::{CancelProbe, GenerateRequest, GenerateResponse, Role},
};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the model server
    pub base_url: String,
    /// Per-request timeout for non-streaming calls
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Client for the local model server
pub struct OllamaClient {
    config: ClientConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ModelList {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

impl OllamaClient {
    /// Create a client with the default local server address
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Create a client with explicit configuration
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// List model names available on the server
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.config.base_url);
        let response = self.http.get(&url).send().await.map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status, text));
        }

        let list: ModelList = response.json().await?;
        Ok(list.models.into_iter().map(|m| m.name).collect())
    }

    /// Open a streaming generation call.
    ///
    /// The returned stream yields one fragment per NDJSON line. The cancel
    /// probe is polled once per received network chunk; cancellation is
    /// cooperative, so a chunk already in flight may still be delivered.
    pub async fn stream(
        &self,
        request: &GenerateRequest,
        cancelled: CancelProbe,
    ) -> Result<ChunkStream> {
        let url = format!("{}/api/generate", self.config.base_url);
        let payload = build_payload(request, true);

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status, text));
        }

        let mut byte_stream = response.bytes_stream();

        let chunks: ChunkStream = Box::pin(stream! {
            let mut buf = String::new();

            while let Some(next) = byte_stream.next().await {
                if cancelled() {
                    return;
                }
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        yield Err(map_send_error(e));
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&bytes));

                // A network chunk may carry several lines, or half of one.
                while let Some(pos) = buf.find('\n') {
                    let line: String = buf.drain(..=pos).collect();
                    if let Some(chunk) = decode_line(&line) {
                        let done = chunk.done;
                        yield Ok(chunk);
                        if done {
                            return;
                        }
                    }
                }
            }

            // Trailing line with no newline terminator.
            if !cancelled() {
                if let Some(chunk) = decode_line(&buf) {
                    yield Ok(chunk);
                }
            }
        });

        Ok(chunks)
    }

    /// Issue a single blocking generation call.
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        cancelled: CancelProbe,
    ) -> Result<GenerateResponse> {
        if cancelled() {
            return Err(Error::Aborted);
        }

        let url = format!("{}/api/generate", self.config.base_url);
        let payload = build_payload(request, false);

        let response = self
            .http
            .post(&url)
            .json(&payload)
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::api(status, text));
        }

        let result: GenerateResponse = response.json().await.map_err(map_send_error)?;

        if cancelled() {
            return Err(Error::Aborted);
        }
        Ok(result)
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Http(e)
    }
}

/// Build the `/api/generate` payload for a request.
fn build_payload(request: &GenerateRequest, stream: bool) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "model": request.model,
        "prompt": build_prompt(request),
        "stream": stream,
    });

    if let Some(ref token) = request.continuation {
        payload["context"] = serde_json::json!(token);
    }
    if let Some(num_ctx) = request.context_length {
        payload["options"] = serde_json::json!({ "num_ctx": num_ctx });
    }
    payload
}

/// Fold attachments and prior history into a single prompt.
fn build_prompt(request: &GenerateRequest) -> String {
    let mut prompt = String::new();

    for file in &request.files {
        prompt.push_str(&format!("[File: {}]\n{}\n\n", file.name, file.content));
    }

    for msg in &request.history {
        let role = match msg.role {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{}: {}\n", role, msg.content));
    }

    prompt.push_str(&request.prompt);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, ContinuationToken, ProcessedFile};

    fn request() -> GenerateRequest {
        GenerateRequest {
            prompt: "What next?".into(),
            model: "llama3".into(),
            history: vec![
                ChatMessage::user("Hi"),
                ChatMessage::assistant("Hello!"),
            ],
            files: vec![ProcessedFile {
                name: "notes.txt".into(),
                content: "remember the milk".into(),
            }],
            continuation: Some(ContinuationToken(vec![7, 8])),
            context_length: Some(4096),
        }
    }

    #[test]
    fn test_build_prompt_order() {
        let prompt = build_prompt(&request());
        let file_pos = prompt.find("[File: notes.txt]").unwrap();
        let history_pos = prompt.find("User: Hi").unwrap();
        let prompt_pos = prompt.find("What next?").unwrap();
        assert!(file_pos < history_pos);
        assert!(history_pos < prompt_pos);
        assert!(prompt.contains("Assistant: Hello!"));
    }

    #[test]
    fn test_build_payload_threads_continuation() {
        let payload = build_payload(&request(), true);
        assert_eq!(payload["model"], "llama3");
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["context"], serde_json::json!([7, 8]));
        assert_eq!(payload["options"]["num_ctx"], 4096);
    }

    #[test]
    fn test_build_payload_omits_absent_fields() {
        let req = GenerateRequest {
            prompt: "hi".into(),
            model: "llama3".into(),
            ..Default::default()
        };
        let payload = build_payload(&req, false);
        assert_eq!(payload["stream"], false);
        assert!(payload.get("context").is_none());
        assert!(payload.get("options").is_none());
    }
}
