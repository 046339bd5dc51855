use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, StartContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::image::CreateImageOptions;
use bollard::network::InspectNetworkOptions;
use bollard::service::{
    ContainerStateStatusEnum, ContainerSummary, DeviceRequest, HostConfig, Mount, MountTypeEnum,
    PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::Docker;
use futures_util::StreamExt;
use regex::Regex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::EngineKind;

use super::gpu::{self, GpuSupport};
use super::images;
use super::{
    CONTROLLER_CONTAINER_NAME, LABEL_ROLE, LABEL_SERVICE, MODEL_STORAGE_VOLUME, ROLE_CONTROLLER,
    SERVICE_MODEL_RUNNER,
};

const WAIT_ATTEMPTS: u32 = 10;
const WAIT_INTERVAL: Duration = Duration::from_millis(500);
const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(100);
const EXEC_TIMEOUT: Duration = Duration::from_secs(10);

/// Matches the engine's name-conflict error and captures the ID of the
/// container a concurrent installer created first.
fn concurrent_install_matcher() -> &'static Regex {
    static MATCHER: OnceLock<Regex> = OnceLock::new();
    MATCHER.get_or_init(|| {
        Regex::new(r#"is already in use by container "([a-z0-9]+)""#).expect("invalid matcher")
    })
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error(transparent)]
    Docker(#[from] bollard::errors::Error),

    #[error("timed out")]
    WaitTimeout,

    #[error("waiting cancelled")]
    WaitCancelled,

    #[error("container is in unexpected state {0:?}")]
    UnexpectedState(String),

    #[error("failed waiting for concurrent installation: {0}")]
    ConcurrentInstall(#[source] Box<InstallError>),

    #[error("command '{cmd}' failed with exit code {code}")]
    ExecFailed { cmd: String, code: i64 },

    #[error("command '{cmd}' timed out after 10 seconds")]
    ExecTimeout { cmd: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, InstallError>;

/// The installed standalone runner, as needed by endpoint derivation.
#[derive(Debug, Clone)]
pub struct StandaloneRunner {
    pub container_id: String,
    pub container_name: String,
    pub port: u16,
    pub gateway_ip: Option<String>,
}

/// Inputs to a create operation that are fixed for the whole process.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    pub port: u16,
    /// Forwarded as `MODEL_RUNNER_ENVIRONMENT` into the container.
    pub environment: String,
    pub do_not_track: bool,
    /// Suppresses the bridge-gateway publish
    /// (`_MODEL_RUNNER_TREAT_DESKTOP_AS_MOBY=1`).
    pub treat_desktop_as_moby: bool,
}

fn controller_filters() -> HashMap<String, Vec<String>> {
    // The service label is queried without a value; cloud middleware only
    // exposes these containers when no value is asked for.
    HashMap::from([(
        "label".to_string(),
        vec![
            LABEL_SERVICE.to_string(),
            format!("{LABEL_ROLE}={ROLE_CONTROLLER}"),
        ],
    )])
}

/// Ensures a standalone runner exists and is healthy. Returns `None` on
/// engine kinds that carry their own runner.
pub async fn ensure_available(
    docker: &Docker,
    kind: EngineKind,
    options: &InstallOptions,
    cancel: &CancellationToken,
    printer: &(dyn Fn(&str) + Send + Sync),
) -> Result<Option<StandaloneRunner>> {
    if !kind.requires_standalone() {
        return Ok(None);
    }

    let gateway_ip = determine_bridge_gateway_ip(docker).await.unwrap_or_else(|err| {
        debug!(%err, "unable to determine bridge gateway IP");
        None
    });

    if let Some((id, name, _summary)) = find_controller_container(docker, printer).await? {
        debug!(container = %name, "standalone runner already present");
        return Ok(Some(StandaloneRunner {
            container_id: id,
            container_name: name,
            port: options.port,
            gateway_ip,
        }));
    }

    let gpu = gpu::detect().await;
    create_controller_container(docker, options, gpu, cancel, printer).await?;

    let (id, name, _summary) = find_controller_container(docker, printer)
        .await?
        .ok_or(InstallError::WaitTimeout)?;
    Ok(Some(StandaloneRunner {
        container_id: id,
        container_name: name,
        port: options.port,
        gateway_ip,
    }))
}

/// Searches for a running controller container, pruning stopped ones first.
/// Returns the container's ID, name, and summary.
pub async fn find_controller_container(
    docker: &Docker,
    printer: &(dyn Fn(&str) + Send + Sync),
) -> Result<Option<(String, String, ContainerSummary)>> {
    prune_controller_containers(docker, true, printer).await?;

    let containers = docker
        .list_containers(Some(ListContainersOptions::<String> {
            filters: controller_filters(),
            ..Default::default()
        }))
        .await?;

    let Some(container) = containers.into_iter().next() else {
        return Ok(None);
    };
    let id = container.id.clone().unwrap_or_default();
    let name = container
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_default();
    Ok(Some((id, name, container)))
}

/// Stops and removes controller containers matched by the label selector.
pub async fn prune_controller_containers(
    docker: &Docker,
    skip_running: bool,
    printer: &(dyn Fn(&str) + Send + Sync),
) -> Result<()> {
    let containers = docker
        .list_containers(Some(ListContainersOptions::<String> {
            all: true,
            filters: controller_filters(),
            ..Default::default()
        }))
        .await?;

    for container in containers {
        if skip_running && container.state.as_deref() == Some("running") {
            continue;
        }
        let id = container.id.clone().unwrap_or_default();
        let short = if id.len() > 12 { &id[..12] } else { &id };
        match container.names.as_ref().and_then(|names| names.first()) {
            Some(name) => printer(&format!(
                "Removing container {} ({short})...",
                name.trim_start_matches('/')
            )),
            None => printer(&format!("Removing container {short}...")),
        }
        docker
            .remove_container(
                &id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await?;
    }
    Ok(())
}

/// Reads the engine's host gateway IP on the `bridge` network. May return
/// `None` without error when no gateway is configured.
pub async fn determine_bridge_gateway_ip(docker: &Docker) -> Result<Option<String>> {
    let bridge = docker
        .inspect_network("bridge", None::<InspectNetworkOptions<String>>)
        .await?;
    let gateway = bridge
        .ipam
        .and_then(|ipam| ipam.config)
        .unwrap_or_default()
        .into_iter()
        .find_map(|config| config.gateway.filter(|gw| !gw.is_empty()));
    Ok(gateway)
}

/// Creates and starts the controller container.
pub async fn create_controller_container(
    docker: &Docker,
    options: &InstallOptions,
    gpu: GpuSupport,
    cancel: &CancellationToken,
    printer: &(dyn Fn(&str) + Send + Sync),
) -> Result<()> {
    let image = images::controller_image(gpu);
    ensure_controller_image(docker, &image, printer).await?;

    let port = options.port.to_string();
    let port_key = format!("{port}/tcp");

    let mut env = vec![
        format!("MODEL_RUNNER_PORT={port}"),
        format!("MODEL_RUNNER_ENVIRONMENT={}", options.environment),
    ];
    if options.do_not_track {
        env.push("DO_NOT_TRACK=1".to_string());
    }

    let mut port_bindings = vec![PortBinding {
        host_ip: Some("127.0.0.1".to_string()),
        host_port: Some(port.clone()),
    }];
    if !options.treat_desktop_as_moby {
        if let Ok(Some(gateway_ip)) = determine_bridge_gateway_ip(docker).await {
            port_bindings.push(PortBinding {
                host_ip: Some(gateway_ip),
                host_port: Some(port.clone()),
            });
        }
    }

    let mut host_config = HostConfig {
        mounts: Some(vec![Mount {
            typ: Some(MountTypeEnum::VOLUME),
            source: Some(MODEL_STORAGE_VOLUME.to_string()),
            target: Some("/models".to_string()),
            ..Default::default()
        }]),
        restart_policy: Some(RestartPolicy {
            name: Some(RestartPolicyNameEnum::ALWAYS),
            ..Default::default()
        }),
        port_bindings: Some(HashMap::from([(port_key.clone(), Some(port_bindings))])),
        ..Default::default()
    };
    if gpu == GpuSupport::Cuda {
        host_config.runtime = Some("nvidia".to_string());
        host_config.device_requests = Some(vec![DeviceRequest {
            count: Some(-1),
            capabilities: Some(vec![vec!["gpu".to_string()]]),
            ..Default::default()
        }]);
    }

    let config = Config {
        image: Some(image),
        env: Some(env),
        exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
        labels: Some(HashMap::from([
            (LABEL_SERVICE.to_string(), SERVICE_MODEL_RUNNER.to_string()),
            (LABEL_ROLE.to_string(), ROLE_CONTROLLER.to_string()),
        ])),
        host_config: Some(host_config),
        ..Default::default()
    };

    // A concurrent installer may win the name; wait for its container
    // instead of failing.
    let created = match docker
        .create_container(
            Some(CreateContainerOptions {
                name: CONTROLLER_CONTAINER_NAME.to_string(),
                platform: None,
            }),
            config,
        )
        .await
    {
        Ok(created) => created,
        Err(err) => {
            if let Some(existing) = concurrent_install_matcher()
                .captures(&err.to_string())
                .and_then(|captures| captures.get(1))
            {
                let existing = existing.as_str().to_string();
                debug!(container = %existing, "concurrent install detected");
                return wait_for_container_to_start(docker, &existing, cancel)
                    .await
                    .map_err(|err| InstallError::ConcurrentInstall(Box::new(err)));
            }
            return Err(err.into());
        }
    };

    printer(&format!(
        "Starting model runner container {CONTROLLER_CONTAINER_NAME}..."
    ));
    if let Err(err) = docker
        .start_container(&created.id, None::<StartContainerOptions<String>>)
        .await
    {
        let _ = docker
            .remove_container(
                &created.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;
        return Err(err.into());
    }

    wait_for_container_to_start(docker, &created.id, cancel).await?;

    if let Err(err) = copy_docker_config_to_container(docker, &created.id).await {
        warn!(%err, "failed to copy registry credentials into the runner container");
    }
    Ok(())
}

async fn ensure_controller_image(
    docker: &Docker,
    image: &str,
    printer: &(dyn Fn(&str) + Send + Sync),
) -> Result<()> {
    if docker.inspect_image(image).await.is_ok() {
        return Ok(());
    }
    printer(&format!("Pulling model runner image {image}..."));
    let mut pull = docker.create_image(
        Some(CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        }),
        None,
        None,
    );
    while let Some(progress) = pull.next().await {
        progress?;
    }
    Ok(())
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            ..
        }
    )
}

/// Polls container state until it is running. There is a window between
/// name registration and inspect visibility, so 404s pass silently until
/// the polling budget runs out; CUDA images are large enough that the
/// window cannot be made tighter.
pub async fn wait_for_container_to_start(
    docker: &Docker,
    container_id: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    for attempt in (0..WAIT_ATTEMPTS).rev() {
        match docker
            .inspect_container(container_id, None::<InspectContainerOptions>)
            .await
        {
            Err(err) if is_not_found(&err) => {}
            Err(err) => return Err(err.into()),
            Ok(status) => match status.state.and_then(|state| state.status) {
                Some(ContainerStateStatusEnum::RUNNING) => return Ok(()),
                Some(ContainerStateStatusEnum::CREATED)
                | Some(ContainerStateStatusEnum::RESTARTING)
                | None => {}
                Some(other) => {
                    return Err(InstallError::UnexpectedState(other.to_string()));
                }
            },
        }
        if attempt > 0 {
            tokio::select! {
                _ = tokio::time::sleep(WAIT_INTERVAL) => {}
                _ = cancel.cancelled() => return Err(InstallError::WaitCancelled),
            }
        }
    }
    Err(InstallError::WaitTimeout)
}

/// Copies the user's registry credentials into the runner container so it
/// can pull from private repositories. A missing source file is not an
/// error.
pub async fn copy_docker_config_to_container(docker: &Docker, container_id: &str) -> Result<()> {
    let Some(config_path) = dirs::home_dir().map(|home| home.join(".docker").join("config.json"))
    else {
        return Ok(());
    };
    let config_data = match tokio::fs::read(&config_path).await {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let mut archive = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_path(".docker/config.json")?;
    header.set_mode(0o600);
    header.set_size(config_data.len() as u64);
    header.set_cksum();
    archive.append(&header, config_data.as_slice())?;
    let archive = archive.into_inner()?;

    exec_in_container(
        docker,
        container_id,
        "mkdir -p /home/modelrunner/.docker && chown modelrunner:modelrunner /home/modelrunner/.docker",
    )
    .await?;

    docker
        .upload_to_container(
            container_id,
            Some(UploadToContainerOptions {
                path: "/home/modelrunner".to_string(),
                ..Default::default()
            }),
            bytes::Bytes::from(archive),
        )
        .await?;

    exec_in_container(
        docker,
        container_id,
        "chown modelrunner:modelrunner /home/modelrunner/.docker/config.json && chmod 600 /home/modelrunner/.docker/config.json",
    )
    .await
}

/// Runs a shell command inside the container and waits for it to finish,
/// polling at 100 ms with a 10 s ceiling.
async fn exec_in_container(docker: &Docker, container_id: &str, cmd: &str) -> Result<()> {
    let exec = docker
        .create_exec(
            container_id,
            CreateExecOptions {
                cmd: Some(vec!["sh".to_string(), "-c".to_string(), cmd.to_string()]),
                ..Default::default()
            },
        )
        .await?;
    docker
        .start_exec(
            &exec.id,
            Some(StartExecOptions {
                detach: true,
                ..Default::default()
            }),
        )
        .await?;

    let poll = async {
        loop {
            let inspect = docker.inspect_exec(&exec.id).await?;
            if inspect.running != Some(true) {
                let code = inspect.exit_code.unwrap_or_default();
                if code != 0 {
                    return Err(InstallError::ExecFailed {
                        cmd: cmd.to_string(),
                        code,
                    });
                }
                return Ok(());
            }
            tokio::time::sleep(EXEC_POLL_INTERVAL).await;
        }
    };

    match tokio::time::timeout(EXEC_TIMEOUT, poll).await {
        Ok(result) => result,
        Err(_) => Err(InstallError::ExecTimeout {
            cmd: cmd.to_string(),
        }),
    }
}
