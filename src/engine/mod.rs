//! Host engine classification and runner endpoint resolution.
//!
//! A command invocation resolves the environment exactly once and threads
//! the resulting [`ModelRunnerContext`] through the rest of the process; no
//! module consults the environment again after resolution.

mod resolver;

pub use resolver::{EngineKind, EnvSnapshot, ModelRunnerContext, ResolveError};

/// Path prefix of the experimental Model Runner REST surface.
pub const API_PREFIX: &str = "/exp/vDD4.40";

/// In-engine hostname of the integrated Desktop runner.
pub const DESKTOP_HOST_URL: &str = "http://model-runner.docker.internal";

/// Endpoint override recognized by the resolver; forces `MobyManual`.
pub const ENV_MODEL_RUNNER_HOST: &str = "MODEL_RUNNER_HOST";

/// When set to `1`, the installer treats a Desktop engine like plain Moby
/// and skips the bridge-gateway port publish.
pub const ENV_TREAT_DESKTOP_AS_MOBY: &str = "_MODEL_RUNNER_TREAT_DESKTOP_AS_MOBY";
