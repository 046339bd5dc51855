//! Standalone runner installation and lifecycle.
//!
//! On plain Moby and cloud engines the runner lives in a dedicated
//! container named `docker-model-runner`, identified by a fixed label pair
//! and published on loopback (plus the bridge gateway, so compose-managed
//! containers can reach it). Installation is idempotent and cooperates with
//! concurrent installers through the engine's name-conflict error.

mod gpu;
mod images;
mod installer;

pub use gpu::{detect as detect_gpu, GpuSupport};
pub use images::{controller_image, CONTROLLER_IMAGE};
pub use installer::{
    copy_docker_config_to_container, create_controller_container, determine_bridge_gateway_ip,
    ensure_available, find_controller_container, prune_controller_containers, InstallError,
    InstallOptions, StandaloneRunner,
};

/// Fixed name of the controller container.
pub const CONTROLLER_CONTAINER_NAME: &str = "docker-model-runner";

/// Named volume mounted at `/models` for the model store.
pub const MODEL_STORAGE_VOLUME: &str = "docker-model-runner-models";

/// Port the runner listens on and publishes, unless overridden through
/// `MODEL_RUNNER_PORT`.
pub const DEFAULT_PORT: u16 = 12434;

pub(crate) const LABEL_SERVICE: &str = "com.docker.desktop.extension.api.service";
pub(crate) const LABEL_ROLE: &str = "com.docker.desktop.extension.api.role";
pub(crate) const SERVICE_MODEL_RUNNER: &str = "model-runner";
pub(crate) const ROLE_CONTROLLER: &str = "controller";

/// The configured runner port.
pub fn runner_port() -> u16 {
    std::env::var("MODEL_RUNNER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}
