//! Typed client for the Model Runner REST surface.

mod client;
mod error;
mod lines;
pub mod reference;
mod types;

pub use client::{RemoveReport, RunnerClient};
pub use error::{ClientError, Result};
pub use lines::LineReader;
pub use types::*;

/// Route prefix of the model store endpoints.
pub const MODELS_PREFIX: &str = "/models";

/// Route prefix of the inference endpoints.
pub const INFERENCE_PREFIX: &str = "/inference";

/// The backend used when none is requested.
pub const DEFAULT_BACKEND: &str = "llama.cpp";

/// Closed set of backends the runner can schedule onto.
pub const VALID_BACKENDS: &[&str] = &["llama.cpp", "openai"];

/// Rejects backend names outside the closed set before dispatch.
pub fn validate_backend(backend: &str) -> Result<()> {
    if VALID_BACKENDS.contains(&backend) {
        return Ok(());
    }
    Err(ClientError::Validation(format!(
        "invalid backend '{}'. Valid backends are: {}",
        backend,
        VALID_BACKENDS.join(", ")
    )))
}

/// Resolves the API key for a backend. The `openai` backend requires
/// `OPENAI_API_KEY`; other backends take no key.
pub fn ensure_api_key(backend: Option<&str>) -> Result<Option<String>> {
    if backend != Some("openai") {
        return Ok(None);
    }
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.is_empty() => Ok(Some(key)),
        _ => Err(ClientError::Validation(
            "the openai backend requires the OPENAI_API_KEY environment variable".to_string(),
        )),
    }
}
