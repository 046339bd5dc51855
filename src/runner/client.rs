//! HTTP client for the Model Runner REST surface.
//!
//! Every reference-taking operation normalizes its argument first and, for
//! bare IDs, expands the short form against the model list. 503 responses
//! map to [`ClientError::ServiceUnavailable`] so callers can distinguish
//! "runner is starting or absent" from real failures.

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::engine::ModelRunnerContext;

use super::error::{ClientError, Result};
use super::lines::LineReader;
use super::reference;
use super::types::*;
use super::{DEFAULT_BACKEND, INFERENCE_PREFIX, MODELS_PREFIX};

pub struct RunnerClient {
    context: ModelRunnerContext,
    http: reqwest::Client,
}

/// Outcome of a multi-reference remove. `missing` lists references that
/// resolved to no model; the rest of the batch is still removed.
#[derive(Debug, Default)]
pub struct RemoveReport {
    pub output: String,
    pub missing: Vec<String>,
}

impl RunnerClient {
    pub fn new(context: ModelRunnerContext) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(format!("docker-model-cli/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("Failed to build HTTP client");
        Self { context, http }
    }

    pub fn context(&self) -> &ModelRunnerContext {
        &self.context
    }

    async fn request(&self, method: Method, path: &str) -> Result<Response> {
        self.request_full(method, path, None, None).await
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: serde_json::Value,
    ) -> Result<Response> {
        self.request_full(method, path, Some(body), None).await
    }

    async fn request_full(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        api_key: Option<&str>,
    ) -> Result<Response> {
        let url = self.context.url(path);
        debug!(%method, %url, "runner request");
        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|source| ClientError::Request {
            path: path.to_string(),
            source,
        })?;
        if resp.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Err(ClientError::ServiceUnavailable);
        }
        Ok(resp)
    }

    async fn api_error(operation: &str, resp: Response) -> ClientError {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        ClientError::Api {
            operation: operation.to_string(),
            status,
            body,
        }
    }

    async fn decode<T: DeserializeOwned>(operation: &str, resp: Response) -> Result<T> {
        if !resp.status().is_success() {
            return Err(Self::api_error(operation, resp).await);
        }
        let bytes = resp.bytes().await.map_err(ClientError::Stream)?;
        serde_json::from_slice(&bytes).map_err(ClientError::Decode)
    }

    /// Probes the runner. A 503 or an unreachable endpoint yields
    /// `running: false` without error; when the runner is up, the body of
    /// `/inference/status` is returned verbatim.
    pub async fn status(&self) -> Result<RunnerStatus> {
        let resp = match self.request(Method::GET, MODELS_PREFIX).await {
            Ok(resp) => resp,
            Err(ClientError::ServiceUnavailable) => return Ok(RunnerStatus::default()),
            Err(ClientError::Request { source, .. }) if source.is_connect() => {
                return Ok(RunnerStatus::default())
            }
            Err(err) => return Err(err),
        };
        if !resp.status().is_success() {
            return Err(Self::api_error("status probe", resp).await);
        }

        let status = match self
            .request(Method::GET, &format!("{INFERENCE_PREFIX}/status"))
            .await
        {
            Ok(resp) => match resp.bytes().await {
                Ok(bytes) => bytes.to_vec(),
                Err(err) => format!("error reading status body: {err}").into_bytes(),
            },
            Err(err) => format!("error querying status: {err}").into_bytes(),
        };
        Ok(RunnerStatus {
            running: true,
            status,
        })
    }

    pub async fn list(&self) -> Result<Vec<Model>> {
        let resp = self.request(Method::GET, MODELS_PREFIX).await?;
        Self::decode("listing models", resp).await
    }

    pub async fn list_openai(
        &self,
        backend: Option<&str>,
        api_key: Option<&str>,
    ) -> Result<OpenAiModelList> {
        let backend = backend.unwrap_or(DEFAULT_BACKEND);
        let path = format!("{INFERENCE_PREFIX}/{backend}/v1/models");
        let resp = self
            .request_full(Method::GET, &path, None, api_key)
            .await?;
        Self::decode("listing models", resp).await
    }

    pub async fn inspect(&self, reference_arg: &str, remote: bool) -> Result<Model> {
        let mut model = reference::normalize(reference_arg);
        if !model.is_empty() && reference::is_bare_id(&model) {
            model = self.full_model_id(&model).await.map_err(|_| {
                ClientError::Validation(format!("invalid model name: {reference_arg}"))
            })?;
        }
        let mut path = format!("{MODELS_PREFIX}/{model}");
        if remote {
            path.push_str("?remote=true");
        }
        let resp = self.request(Method::GET, &path).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { reference: model });
        }
        Self::decode("inspecting model", resp).await
    }

    pub async fn inspect_openai(&self, reference_arg: &str) -> Result<OpenAiModel> {
        let mut model = reference::normalize(reference_arg);
        if reference::is_bare_id(&model) {
            model = self.full_model_id(&model).await.map_err(|_| {
                ClientError::Validation(format!("invalid model name: {reference_arg}"))
            })?;
        }
        let path = format!("{INFERENCE_PREFIX}/v1/models/{model}");
        let resp = self.request(Method::GET, &path).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound { reference: model });
        }
        Self::decode("inspecting model", resp).await
    }

    /// Expands a short model ID to the full digest by listing models and
    /// matching on the 12-hex shorthand, the unprefixed digest, or the
    /// whole ID.
    async fn full_model_id(&self, id: &str) -> Result<String> {
        let models = self.list().await?;
        for model in &models {
            if reference::id_matches(id, &model.id) {
                return Ok(model.id.clone());
            }
        }
        Err(ClientError::Validation(format!(
            "model with ID {id} not found"
        )))
    }

    /// Best-effort bare-ID expansion: falls back to the input when the
    /// lookup fails, letting the server report the miss.
    async fn expand_bare_id(&self, model: String) -> String {
        if reference::is_bare_id(&model) {
            if let Ok(expanded) = self.full_model_id(&model).await {
                return expanded;
            }
        }
        model
    }

    /// Pulls a model, feeding each decoded progress message to
    /// `on_progress`. Returns the server's success message.
    pub async fn pull<F>(
        &self,
        reference_arg: &str,
        ignore_runtime_memory_check: bool,
        mut on_progress: F,
    ) -> Result<String>
    where
        F: FnMut(&ProgressMessage),
    {
        let model = reference::normalize(reference_arg);
        let body = serde_json::to_value(ModelCreateRequest {
            from: model.clone(),
            ignore_runtime_memory_check,
        })
        .map_err(ClientError::Decode)?;
        let resp = self
            .request_json(Method::POST, &format!("{MODELS_PREFIX}/create"), body)
            .await?;
        if !resp.status().is_success() {
            return Err(Self::api_error(&format!("pulling {model}"), resp).await);
        }
        self.consume_progress_stream(resp, &model, "pulling", &mut on_progress)
            .await
    }

    /// Pushes a model. Progress messages are forwarded without layer
    /// aggregation.
    pub async fn push<F>(&self, reference_arg: &str, mut on_progress: F) -> Result<String>
    where
        F: FnMut(&ProgressMessage),
    {
        let model = reference::normalize(reference_arg);
        let resp = self
            .request(Method::POST, &format!("{MODELS_PREFIX}/{model}/push"))
            .await?;
        if !resp.status().is_success() {
            return Err(Self::api_error(&format!("pushing {model}"), resp).await);
        }
        self.consume_progress_stream(resp, &model, "pushing", &mut on_progress)
            .await
    }

    async fn consume_progress_stream(
        &self,
        resp: Response,
        model: &str,
        verb: &str,
        on_progress: &mut dyn FnMut(&ProgressMessage),
    ) -> Result<String> {
        let mut lines = LineReader::new(resp);
        while let Some(line) = lines.next_line().await? {
            if line.is_empty() {
                continue;
            }
            let msg: ProgressMessage = serde_json::from_str(&line).map_err(|err| {
                ClientError::StreamProtocol(format!("error parsing progress message: {err}"))
            })?;
            match msg.kind.as_str() {
                "progress" => on_progress(&msg),
                "error" => {
                    return Err(ClientError::StreamProtocol(format!(
                        "error {verb} model: {}",
                        msg.message
                    )))
                }
                "success" => return Ok(msg.message),
                other => {
                    return Err(ClientError::StreamProtocol(format!(
                        "unknown message type: {other}"
                    )))
                }
            }
        }
        Err(ClientError::UnexpectedEndOfStream {
            reference: model.to_string(),
        })
    }

    /// Opens the streamed chat completion. The response body is an
    /// SSE-style stream consumed by the chat stream engine.
    pub async fn chat_completions(
        &self,
        backend: Option<&str>,
        model_arg: &str,
        prompt: &str,
        api_key: Option<&str>,
    ) -> Result<Response> {
        let model = self
            .expand_bare_id(reference::normalize(model_arg))
            .await;
        let body = serde_json::to_value(ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            stream: true,
        })
        .map_err(ClientError::Decode)?;

        let path = match backend {
            Some(backend) => format!("{INFERENCE_PREFIX}/{backend}/v1/chat/completions"),
            None => format!("{INFERENCE_PREFIX}/v1/chat/completions"),
        };
        let resp = self
            .request_full(Method::POST, &path, Some(body), api_key)
            .await?;
        if !resp.status().is_success() {
            return Err(Self::api_error("chat completion", resp).await);
        }
        Ok(resp)
    }

    /// Removes models. Not-found references are collected and reported in
    /// the result instead of aborting the batch.
    pub async fn remove(&self, references: &[String], force: bool) -> Result<RemoveReport> {
        let mut report = RemoveReport::default();
        for reference_arg in references {
            let model = self
                .expand_bare_id(reference::normalize(reference_arg))
                .await;
            let path = format!("{MODELS_PREFIX}/{model}?force={force}");
            let resp = self.request(Method::DELETE, &path).await?;
            match resp.status() {
                StatusCode::OK => {
                    let bytes = resp.bytes().await.map_err(ClientError::Stream)?;
                    match serde_json::from_slice::<DeleteModelResponse>(&bytes) {
                        Ok(entries) => {
                            for entry in entries {
                                if let Some(untagged) = entry.untagged {
                                    report.output.push_str(&format!("Untagged: {untagged}\n"));
                                }
                                if let Some(deleted) = entry.deleted {
                                    report.output.push_str(&format!("Deleted: {deleted}\n"));
                                }
                            }
                        }
                        Err(err) => report.output.push_str(&format!(
                            "Model {model} removed successfully, but failed to parse response: {err}\n"
                        )),
                    }
                }
                StatusCode::NOT_FOUND => report.missing.push(model),
                _ => return Err(Self::api_error(&format!("removing {model}"), resp).await),
            }
        }
        Ok(report)
    }

    /// Applies a new tag to a model. The runner answers 201 Created.
    pub async fn tag(&self, source_arg: &str, repo: &str, tag: &str) -> Result<()> {
        let source = self
            .expand_bare_id(reference::normalize(source_arg))
            .await;
        let path = format!("{MODELS_PREFIX}/{source}/tag?repo={repo}&tag={tag}");
        let resp = self.request(Method::POST, &path).await?;
        if resp.status() != StatusCode::CREATED {
            return Err(Self::api_error("tagging", resp).await);
        }
        Ok(())
    }

    /// Streams a model tarball into the runner's store.
    pub async fn load(&self, body: reqwest::Body) -> Result<()> {
        let path = format!("{MODELS_PREFIX}/load");
        let url = self.context.url(&path);
        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/x-tar")
            .body(body)
            .send()
            .await
            .map_err(|source| ClientError::Request { path, source })?;
        match resp.status() {
            StatusCode::SERVICE_UNAVAILABLE => Err(ClientError::ServiceUnavailable),
            StatusCode::OK | StatusCode::CREATED => Ok(()),
            _ => Err(Self::api_error("loading model", resp).await),
        }
    }

    pub async fn ps(&self) -> Result<Vec<BackendStatus>> {
        let resp = self
            .request(Method::GET, &format!("{INFERENCE_PREFIX}/ps"))
            .await?;
        Self::decode("listing running models", resp).await
    }

    pub async fn df(&self) -> Result<DiskUsage> {
        let resp = self
            .request(Method::GET, &format!("{INFERENCE_PREFIX}/df"))
            .await?;
        Self::decode("getting disk usage", resp).await
    }

    pub async fn unload(&self, request: UnloadRequest) -> Result<UnloadResponse> {
        let body = serde_json::to_value(&request).map_err(ClientError::Decode)?;
        let resp = self
            .request_json(Method::POST, &format!("{INFERENCE_PREFIX}/unload"), body)
            .await?;
        Self::decode("unloading", resp).await
    }

    /// Configures a backend for a model. 202 is the only success; a 409
    /// surfaces the server-provided message verbatim.
    pub async fn configure_backend(&self, request: ConfigureRequest) -> Result<()> {
        let body = serde_json::to_value(&request).map_err(ClientError::Decode)?;
        let resp = self
            .request_json(Method::POST, &format!("{INFERENCE_PREFIX}/_configure"), body)
            .await?;
        match resp.status() {
            StatusCode::ACCEPTED => Ok(()),
            StatusCode::CONFLICT => {
                let body = resp.text().await.unwrap_or_default();
                Err(ClientError::Conflict(body))
            }
            _ => Err(Self::api_error("configuring backend", resp).await),
        }
    }
}
