use std::env;
use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::{API_PREFIX, DESKTOP_HOST_URL, ENV_MODEL_RUNNER_HOST, ENV_TREAT_DESKTOP_AS_MOBY};

/// Deployment shape of the host container engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    /// Integrated Desktop engine with a built-in runner.
    Desktop,
    /// Plain engine; the runner is installed as a standalone container.
    Moby,
    /// Endpoint supplied via environment override; no install is attempted.
    MobyManual,
    /// Remote cloud engine; the runner is installed as a standalone container.
    Cloud,
}

impl EngineKind {
    /// True when the runner must be provided by the standalone installer.
    pub fn requires_standalone(&self) -> bool {
        matches!(self, EngineKind::Moby | EngineKind::Cloud)
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineKind::Desktop => write!(f, "desktop"),
            EngineKind::Moby => write!(f, "moby"),
            EngineKind::MobyManual => write!(f, "moby (manual endpoint)"),
            EngineKind::Cloud => write!(f, "cloud"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no usable container engine or model runner endpoint could be determined")]
    EnvironmentIndeterminate,
}

const DESKTOP_CONTEXTS: &[&str] = &["desktop-linux", "desktop-windows"];
const CLOUD_CONTEXT_PREFIX: &str = "docker-cloud";
const DEFAULT_CONTEXT: &str = "default";

/// One immutable snapshot of the environment inputs to resolution.
///
/// Captured once per process; endpoint derivation is a pure function of this
/// snapshot and the engine kind.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
    pub model_runner_host: Option<String>,
    pub docker_host: Option<String>,
    pub docker_context: Option<String>,
    pub config_current_context: Option<String>,
    pub treat_desktop_as_moby: bool,
}

#[derive(Debug, Default, Deserialize)]
struct DockerCliConfig {
    #[serde(rename = "currentContext")]
    current_context: Option<String>,
}

impl EnvSnapshot {
    pub fn capture() -> Self {
        Self {
            model_runner_host: env::var(ENV_MODEL_RUNNER_HOST).ok().filter(|v| !v.is_empty()),
            docker_host: env::var("DOCKER_HOST").ok().filter(|v| !v.is_empty()),
            docker_context: env::var("DOCKER_CONTEXT").ok().filter(|v| !v.is_empty()),
            config_current_context: read_config_current_context(),
            treat_desktop_as_moby: env::var(ENV_TREAT_DESKTOP_AS_MOBY).as_deref() == Ok("1"),
        }
    }

    /// The effective engine context name. `DOCKER_HOST` pins the default
    /// context, `DOCKER_CONTEXT` overrides the CLI configuration file.
    pub fn current_context(&self) -> &str {
        if self.docker_host.is_some() {
            return DEFAULT_CONTEXT;
        }
        if let Some(name) = &self.docker_context {
            return name;
        }
        if let Some(name) = &self.config_current_context {
            return name;
        }
        DEFAULT_CONTEXT
    }

    /// Classifies the engine. First match wins:
    /// endpoint override, Desktop context, cloud context, plain Moby.
    pub fn classify(&self) -> EngineKind {
        if self.model_runner_host.is_some() {
            return EngineKind::MobyManual;
        }
        let context = self.current_context();
        if DESKTOP_CONTEXTS.contains(&context) {
            return EngineKind::Desktop;
        }
        if context.starts_with(CLOUD_CONTEXT_PREFIX) {
            return EngineKind::Cloud;
        }
        EngineKind::Moby
    }
}

fn docker_config_path() -> Option<PathBuf> {
    if let Ok(dir) = env::var("DOCKER_CONFIG") {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir).join("config.json"));
        }
    }
    dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
}

fn read_config_current_context() -> Option<String> {
    let path = docker_config_path()?;
    let data = std::fs::read(&path).ok()?;
    let config: DockerCliConfig = serde_json::from_slice(&data).ok()?;
    config.current_context.filter(|name| !name.is_empty())
}

/// The resolved runner context: engine kind plus the base URL all client
/// requests are made against.
#[derive(Debug, Clone)]
pub struct ModelRunnerContext {
    kind: EngineKind,
    base_url: String,
}

impl ModelRunnerContext {
    /// Resolves the engine kind and, where it is known up front, the
    /// endpoint. For `Moby` and `Cloud` the endpoint is completed by
    /// [`ModelRunnerContext::with_standalone_port`] once the standalone
    /// runner's published port is known.
    pub fn resolve(snapshot: &EnvSnapshot) -> Result<Self, ResolveError> {
        let kind = snapshot.classify();
        debug!(context = snapshot.current_context(), %kind, "resolved engine");
        let base_url = match kind {
            EngineKind::MobyManual => snapshot
                .model_runner_host
                .clone()
                .ok_or(ResolveError::EnvironmentIndeterminate)?
                .trim_end_matches('/')
                .to_string(),
            EngineKind::Desktop => DESKTOP_HOST_URL.to_string(),
            // Completed post-install.
            EngineKind::Moby | EngineKind::Cloud => String::new(),
        };
        Ok(Self { kind, base_url })
    }

    /// Completes a `Moby`/`Cloud` context with the standalone runner's
    /// loopback port.
    pub fn with_standalone_port(mut self, port: u16) -> Self {
        if self.kind.requires_standalone() {
            self.base_url = format!("http://127.0.0.1:{port}");
        }
        self
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Joins a runner API path (e.g. `/models/create`) onto the endpoint,
    /// inserting the experimental API prefix.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// URL for compose consumers: `<base>/engines/v1` style, no API prefix.
    pub fn engines_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> EnvSnapshot {
        EnvSnapshot::default()
    }

    #[test]
    fn override_env_forces_moby_manual() {
        let snap = EnvSnapshot {
            model_runner_host: Some("http://10.0.0.5:12434".into()),
            docker_context: Some("desktop-linux".into()),
            ..snapshot()
        };
        assert_eq!(snap.classify(), EngineKind::MobyManual);
    }

    #[test]
    fn desktop_context_maps_to_desktop() {
        for name in ["desktop-linux", "desktop-windows"] {
            let snap = EnvSnapshot {
                docker_context: Some(name.into()),
                ..snapshot()
            };
            assert_eq!(snap.classify(), EngineKind::Desktop);
        }
    }

    #[test]
    fn cloud_context_maps_to_cloud() {
        let snap = EnvSnapshot {
            config_current_context: Some("docker-cloud-staging".into()),
            ..snapshot()
        };
        assert_eq!(snap.classify(), EngineKind::Cloud);
    }

    #[test]
    fn docker_host_pins_default_context() {
        let snap = EnvSnapshot {
            docker_host: Some("unix:///var/run/docker.sock".into()),
            docker_context: Some("desktop-linux".into()),
            ..snapshot()
        };
        assert_eq!(snap.current_context(), "default");
        assert_eq!(snap.classify(), EngineKind::Moby);
    }

    #[test]
    fn everything_else_is_moby() {
        assert_eq!(snapshot().classify(), EngineKind::Moby);
    }

    #[test]
    fn manual_endpoint_is_used_verbatim() {
        let snap = EnvSnapshot {
            model_runner_host: Some("http://10.0.0.5:12434/".into()),
            ..snapshot()
        };
        let ctx = ModelRunnerContext::resolve(&snap).unwrap();
        assert_eq!(ctx.kind(), EngineKind::MobyManual);
        assert_eq!(ctx.url("/models"), "http://10.0.0.5:12434/exp/vDD4.40/models");
    }

    #[test]
    fn desktop_uses_virtual_host() {
        let snap = EnvSnapshot {
            docker_context: Some("desktop-linux".into()),
            ..snapshot()
        };
        let ctx = ModelRunnerContext::resolve(&snap).unwrap();
        assert_eq!(
            ctx.url("/models"),
            "http://model-runner.docker.internal/exp/vDD4.40/models"
        );
    }

    #[test]
    fn standalone_port_completes_moby_endpoint() {
        let ctx = ModelRunnerContext::resolve(&snapshot())
            .unwrap()
            .with_standalone_port(12434);
        assert_eq!(ctx.base_url(), "http://127.0.0.1:12434");
    }
}
