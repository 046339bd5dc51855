//! Wire types for the Model Runner REST surface.

use serde::{Deserialize, Serialize};

/// A model as reported by the runner's model store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub config: ModelConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub quantization: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default)]
    pub size: String,
}

/// OpenAI-style model listing returned by `/inference/{backend}/v1/models`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiModelList {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub data: Vec<OpenAiModel>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpenAiModel {
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub owned_by: String,
}

/// Body of `POST /models/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCreateRequest {
    pub from: String,
    #[serde(rename = "ignoreRuntimeMemoryCheck", default)]
    pub ignore_runtime_memory_check: bool,
}

/// One line of the NDJSON pull/push progress stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub layer: ProgressLayer,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressLayer {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub current: u64,
}

/// Chat completion request; the runner speaks the OpenAI wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// One decoded `data:` frame of the streamed chat response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatStreamResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub delta: ChatDelta,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatDelta {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub reasoning_content: String,
}

/// An active backend as reported by `/inference/ps`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendStatus {
    #[serde(default)]
    pub backend_name: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub last_used: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DiskUsage {
    #[serde(default)]
    pub models_disk_usage: i64,
    #[serde(default)]
    pub default_backend_disk_usage: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnloadRequest {
    pub all: bool,
    #[serde(default)]
    pub backend: String,
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UnloadResponse {
    #[serde(default)]
    pub unloaded_runners: u64,
}

/// Body of `POST /inference/_configure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureRequest {
    pub model: String,
    #[serde(rename = "context_size")]
    pub context_size: i64,
    #[serde(rename = "runtime_flags", default)]
    pub runtime_flags: String,
}

/// Response entries of `DELETE /models/{ref}`.
pub type DeleteModelResponse = Vec<DeleteModelEntry>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteModelEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untagged: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<String>,
}

/// Result of probing the runner.
#[derive(Debug, Default)]
pub struct RunnerStatus {
    pub running: bool,
    /// Verbatim body of `/inference/status` when the runner is up.
    pub status: Vec<u8>,
}
