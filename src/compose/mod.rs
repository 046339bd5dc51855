//! Compose hook: JSON-line event bridge driven by the outer orchestrator.
//!
//! `up` makes the requested models available (install runner, pull missing
//! models, configure backends) and hands the orchestrator the runner URL
//! and model list through `setenv` frames on stdout. `down` has no cleanup
//! to do.

use serde::Serialize;

use crate::engine::{EngineKind, ModelRunnerContext, DESKTOP_HOST_URL};
use crate::runner::{ClientError, ConfigureRequest, RunnerClient};
use crate::standalone::StandaloneRunner;

#[derive(Debug, Serialize)]
struct JsonMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    message: &'a str,
}

fn emit(kind: &str, message: &str) {
    let frame = JsonMessage { kind, message };
    // Frames are the wire protocol to the orchestrator; serialization of
    // two plain strings cannot fail.
    println!(
        "{}",
        serde_json::to_string(&frame).expect("event frame serialization")
    );
}

pub fn send_info(message: &str) {
    emit("info", message);
}

pub fn send_error(message: &str) {
    emit("error", message);
}

pub fn setenv(key: &str, value: &str) {
    emit("setenv", &format!("{key}={value}"));
}

/// Derives the runner URL handed to compose-managed containers.
pub fn consumer_url(
    context: &ModelRunnerContext,
    standalone: Option<&StandaloneRunner>,
) -> Result<String, ClientError> {
    match context.kind() {
        EngineKind::Desktop => Ok(format!("{DESKTOP_HOST_URL}/engines/v1/")),
        EngineKind::MobyManual => Ok(context.engines_url("/engines/v1/")),
        EngineKind::Moby | EngineKind::Cloud => {
            let standalone = standalone.ok_or_else(|| {
                ClientError::Validation(
                    "unable to determine standalone runner endpoint".to_string(),
                )
            })?;
            let gateway = standalone.gateway_ip.as_deref().filter(|ip| !ip.is_empty());
            match gateway {
                Some(gateway) => {
                    Ok(format!("http://{gateway}:{}/engines/v1", standalone.port))
                }
                None => Err(ClientError::Validation(
                    "unable to determine standalone runner endpoint".to_string(),
                )),
            }
        }
    }
}

/// Pulls each requested model that is not already present locally, matched
/// by ID or any tag.
pub async fn pull_missing_models(
    client: &RunnerClient,
    models: &[String],
) -> Result<(), ClientError> {
    let downloaded = client.list().await.map_err(|err| {
        send_error(&format!("Failed to get models list: {err}"));
        err
    })?;

    for model in models {
        let present = downloaded.iter().any(|candidate| {
            candidate.id == *model || candidate.tags.iter().any(|tag| tag == model)
        });
        if present {
            continue;
        }
        client
            .pull(model, false, |msg| {
                if !msg.message.is_empty() {
                    send_info(&msg.message);
                }
            })
            .await
            .map_err(|err| {
                send_error(&format!("Failed to pull model: {err}"));
                err
            })?;
    }
    Ok(())
}

/// Configures the backend for every requested model; failures abort.
pub async fn configure_models(
    client: &RunnerClient,
    models: &[String],
    context_size: i64,
    runtime_flags: &str,
) -> Result<(), ClientError> {
    for model in models {
        client
            .configure_backend(ConfigureRequest {
                model: model.clone(),
                context_size,
                runtime_flags: runtime_flags.to_string(),
            })
            .await
            .map_err(|err| {
                send_error(&format!(
                    "failed to configure backend for model {model} with context-size {context_size} and runtime-flags {runtime_flags}: {err}"
                ));
                err
            })?;
        send_info(&format!("Successfully configured backend for model {model}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EnvSnapshot;

    fn context_for(snapshot: EnvSnapshot) -> ModelRunnerContext {
        ModelRunnerContext::resolve(&snapshot).unwrap()
    }

    #[test]
    fn desktop_url_uses_virtual_host() {
        let context = context_for(EnvSnapshot {
            docker_context: Some("desktop-linux".into()),
            ..Default::default()
        });
        assert_eq!(
            consumer_url(&context, None).unwrap(),
            "http://model-runner.docker.internal/engines/v1/"
        );
    }

    #[test]
    fn manual_url_appends_engines_path() {
        let context = context_for(EnvSnapshot {
            model_runner_host: Some("http://10.0.0.5:12434".into()),
            ..Default::default()
        });
        assert_eq!(
            consumer_url(&context, None).unwrap(),
            "http://10.0.0.5:12434/engines/v1/"
        );
    }

    #[test]
    fn moby_url_targets_bridge_gateway() {
        let context = context_for(EnvSnapshot::default());
        let standalone = StandaloneRunner {
            container_id: "abc".into(),
            container_name: "docker-model-runner".into(),
            port: 12434,
            gateway_ip: Some("172.17.0.1".into()),
        };
        assert_eq!(
            consumer_url(&context, Some(&standalone)).unwrap(),
            "http://172.17.0.1:12434/engines/v1"
        );
    }

    #[test]
    fn moby_without_gateway_is_an_error() {
        let context = context_for(EnvSnapshot::default());
        let standalone = StandaloneRunner {
            container_id: "abc".into(),
            container_name: "docker-model-runner".into(),
            port: 12434,
            gateway_ip: None,
        };
        assert!(consumer_url(&context, Some(&standalone)).is_err());
        assert!(consumer_url(&context, None).is_err());
    }
}
