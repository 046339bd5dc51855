//! Command handlers: resolve the environment once, construct the runner
//! client, and drive the requested operation.

use std::io::IsTerminal;

use anyhow::{bail, Context as _, Result};
use bollard::volume::RemoveVolumeOptions;
use bollard::Docker;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::chat::{self, History};
use crate::compose;
use crate::engine::{EngineKind, EnvSnapshot, ModelRunnerContext};
use crate::progress::{self, PullProgress};
use crate::runner::{self, reference, ClientError, RunnerClient, UnloadRequest};
use crate::standalone::{self, InstallOptions, StandaloneRunner};

use super::commands::*;
use super::output;

type Printer = dyn Fn(&str) + Send + Sync;

/// The per-invocation connection: a client against the resolved endpoint
/// plus the standalone runner details when one is in play.
pub struct Session {
    pub client: RunnerClient,
    pub standalone: Option<StandaloneRunner>,
}

fn install_options(kind: EngineKind, snapshot: &EnvSnapshot) -> InstallOptions {
    InstallOptions {
        port: standalone::runner_port(),
        environment: match kind {
            EngineKind::Cloud => "cloud",
            _ => "moby",
        }
        .to_string(),
        do_not_track: std::env::var("DO_NOT_TRACK").as_deref() == Ok("1"),
        treat_desktop_as_moby: snapshot.treat_desktop_as_moby,
    }
}

/// Resolves the engine and builds the client. With `install`, a missing
/// standalone runner is created first; without it, an existing controller
/// is used when present and the loopback endpoint is assumed otherwise.
async fn connect(install: bool, cancel: &CancellationToken, printer: &Printer) -> Result<Session> {
    let snapshot = EnvSnapshot::capture();
    let mut context = ModelRunnerContext::resolve(&snapshot)?;
    debug!(kind = %context.kind(), "resolved model runner context");

    let mut standalone_runner = None;
    if context.kind().requires_standalone() {
        let docker = Docker::connect_with_local_defaults()
            .context("no usable container engine: cannot connect to the engine socket")?;
        if install {
            standalone_runner = standalone::ensure_available(
                &docker,
                context.kind(),
                &install_options(context.kind(), &snapshot),
                cancel,
                printer,
            )
            .await?;
        } else {
            standalone_runner = standalone::find_controller_container(&docker, printer)
                .await?
                .map(|(container_id, container_name, _)| StandaloneRunner {
                    container_id,
                    container_name,
                    port: standalone::runner_port(),
                    gateway_ip: None,
                });
        }
        let port = standalone_runner
            .as_ref()
            .map(|runner| runner.port)
            .unwrap_or_else(standalone::runner_port);
        context = context.with_standalone_port(port);
    }

    Ok(Session {
        client: RunnerClient::new(context),
        standalone: standalone_runner,
    })
}

fn is_not_running(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ClientError>()
            .is_some_and(ClientError::is_not_running)
    })
}

fn print_error(err: &anyhow::Error) {
    if is_not_running(err) {
        eprintln!(
            "Docker Model Runner is not running. Start Docker Desktop or run \
             'model-cli install-runner' first."
        );
        return;
    }
    eprintln!("Error: {err:#}");
}

/// Runs the selected command and returns the process exit code.
pub async fn dispatch(args: CliArgs) -> i32 {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let quiet = args.quiet;
    let printer: Box<Printer> = Box::new(move |message: &str| {
        if !quiet {
            println!("{message}");
        }
    });

    let result = match args.command {
        Commands::Status => handle_status(&cancel, &printer).await,
        Commands::Pull(pull) => handle_pull(pull, &cancel, &printer).await,
        Commands::Push(push) => handle_push(push, &cancel, &printer).await,
        Commands::List(list) => handle_list(list, quiet, &cancel, &printer).await,
        Commands::Inspect(inspect) => handle_inspect(inspect, &cancel, &printer).await,
        Commands::Run(run) => handle_run(run, &cancel, &printer).await,
        Commands::Remove(remove) => handle_remove(remove, &cancel, &printer).await,
        Commands::Tag(tag) => handle_tag(tag, &cancel, &printer).await,
        Commands::Load(load) => handle_load(load, &cancel, &printer).await,
        Commands::Ps => handle_ps(&cancel, &printer).await,
        Commands::Df => handle_df(&cancel, &printer).await,
        Commands::Unload(unload) => handle_unload(unload, &cancel, &printer).await,
        Commands::InstallRunner => handle_install_runner(&cancel, &printer).await,
        Commands::UninstallRunner(uninstall) => handle_uninstall_runner(uninstall, &printer).await,
        Commands::Compose(compose_command) => match compose_command {
            ComposeCommands::Up(up) => handle_compose_up(up, &cancel).await,
            ComposeCommands::Down(_) => Ok(()),
        },
    };

    match result {
        Ok(()) => 0,
        Err(err) => {
            print_error(&err);
            1
        }
    }
}

/// Splits `repo[:tag]`, defaulting the tag to `latest`. A colon inside the
/// registry host (port) does not count as a tag separator.
fn split_reference(model: &str) -> (&str, &str) {
    if let Some(idx) = model.rfind(':') {
        if !model[idx + 1..].contains('/') {
            return (&model[..idx], &model[idx + 1..]);
        }
    }
    (model, "latest")
}

async fn handle_status(cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let status = session.client.status().await?;
    if !status.running {
        bail!("Docker Model Runner is not running");
    }
    println!("Docker Model Runner is running");
    if !status.status.is_empty() {
        println!("Status:");
        print!("{}", String::from_utf8_lossy(&status.status));
    }
    Ok(())
}

pub(crate) async fn pull_model(
    client: &RunnerClient,
    model: &str,
    ignore_runtime_memory_check: bool,
) -> Result<()> {
    let (repo, tag) = split_reference(model);
    if !model.contains(':') {
        println!("Using default tag: latest");
    }
    println!("{repo}:{tag}: Pulling from {repo}");

    let tracker = PullProgress::new();
    let result = client
        .pull(model, ignore_runtime_memory_check, |msg| tracker.handle(msg))
        .await;
    tracker.stop();
    let message = result.context("Failed to pull model")?;

    if tracker.progress_shown() {
        println!();
    }
    if !tracker.progress_shown() && !tracker.has_layers() {
        println!("Status: Model is up to date for {repo}:{tag}");
    } else {
        println!("Status: {message}");
    }
    println!("{model}");
    Ok(())
}

async fn handle_pull(args: PullArgs, cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(true, cancel, printer)
        .await
        .context("unable to initialize standalone model runner")?;
    pull_model(&session.client, &args.model, args.ignore_runtime_memory_check).await
}

async fn handle_push(args: PushArgs, cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let message = session
        .client
        .push(&args.model, |msg| progress::line_progress(&msg.message))
        .await
        .context("Failed to push model")?;
    println!();
    println!("Status: {message}");
    Ok(())
}

async fn handle_list(
    args: ListArgs,
    quiet: bool,
    cancel: &CancellationToken,
    printer: &Printer,
) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    if args.openai {
        if let Some(backend) = args.backend.as_deref() {
            runner::validate_backend(backend)?;
        }
        let api_key = runner::ensure_api_key(args.backend.as_deref())?;
        let models = session
            .client
            .list_openai(args.backend.as_deref(), api_key.as_deref())
            .await
            .context("Failed to list models")?;
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }
    let models = session.client.list().await.context("Failed to list models")?;
    if quiet {
        for model in &models {
            println!("{}", reference::short_id(&model.id));
        }
        return Ok(());
    }
    println!("{}", output::models_table(&models));
    Ok(())
}

async fn handle_inspect(
    args: InspectArgs,
    cancel: &CancellationToken,
    printer: &Printer,
) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let rendered = if args.openai {
        let model = session
            .client
            .inspect_openai(&args.model)
            .await
            .context("Failed to inspect model")?;
        serde_json::to_string_pretty(&model)?
    } else {
        let model = session
            .client
            .inspect(&args.model, args.remote)
            .await
            .context("Failed to inspect model")?;
        serde_json::to_string_pretty(&model)?
    };
    println!("{rendered}");
    Ok(())
}

async fn handle_run(args: RunArgs, cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    if let Some(backend) = args.backend.as_deref() {
        runner::validate_backend(backend)?;
    }
    let api_key = runner::ensure_api_key(args.backend.as_deref())?;

    let mut prompt = args.prompt.join(" ");
    if !std::io::stdin().is_terminal() {
        let mut piped = String::new();
        tokio::io::stdin()
            .read_to_string(&mut piped)
            .await
            .context("failed to read stdin")?;
        if !piped.is_empty() {
            if !prompt.is_empty() {
                prompt.push('\n');
            }
            prompt.push_str(&piped);
        }
    }

    if args.debug {
        if prompt.is_empty() {
            println!("Running model {}", args.model);
        } else {
            println!("Running model {} with prompt {}", args.model, prompt);
        }
    }

    let session = connect(true, cancel, printer)
        .await
        .context("unable to initialize standalone model runner")?;

    // The OpenAI backend validates its own model names remotely.
    if args.backend.as_deref() != Some("openai") {
        match session.client.inspect(&args.model, false).await {
            Ok(_) => {}
            Err(ClientError::NotFound { .. }) => {
                println!(
                    "Unable to find model '{}' locally. Pulling from the server.",
                    args.model
                );
                pull_model(
                    &session.client,
                    &args.model,
                    args.ignore_runtime_memory_check,
                )
                .await?;
            }
            Err(err) => return Err(err).context("Failed to inspect model"),
        }
    }

    if !prompt.is_empty() {
        let response = session
            .client
            .chat_completions(args.backend.as_deref(), &args.model, &prompt, api_key.as_deref())
            .await
            .context("Failed to generate a response")?;
        chat::stream::render(response, &mut std::io::stdout())
            .await
            .context("Failed to generate a response")?;
        println!();
        return Ok(());
    }

    let config_dir = dirs::config_dir().context("unable to determine the config directory")?;
    let history = History::new(&config_dir).context("unable to initialize history")?;
    chat::repl::run(
        &session.client,
        args.backend.as_deref(),
        &args.model,
        api_key.as_deref(),
        history,
        cancel,
    )
    .await
}

async fn handle_remove(
    args: RemoveArgs,
    cancel: &CancellationToken,
    printer: &Printer,
) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let report = session
        .client
        .remove(&args.models, args.force)
        .await
        .context("Failed to remove model")?;
    print!("{}", report.output);
    if !report.missing.is_empty() {
        bail!("no such model: {}", report.missing.join(", "));
    }
    Ok(())
}

async fn handle_tag(args: TagArgs, cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let (repo, tag) = split_reference(&args.target);
    session
        .client
        .tag(&args.source, repo, tag)
        .await
        .context("Failed to tag model")?;
    println!("Model {} tagged successfully as {repo}:{tag}", args.source);
    Ok(())
}

async fn handle_load(args: LoadArgs, cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let body = if args.path.as_os_str() == "-" {
        reqwest::Body::wrap_stream(ReaderStream::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(&args.path)
            .await
            .with_context(|| format!("failed to open {}", args.path.display()))?;
        reqwest::Body::wrap_stream(ReaderStream::new(file))
    };
    session
        .client
        .load(body)
        .await
        .context("Failed to load model")?;
    println!("Model loaded successfully");
    Ok(())
}

async fn handle_ps(cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let statuses = session
        .client
        .ps()
        .await
        .context("Failed to list running models")?;
    println!("{}", output::ps_table(&statuses));
    Ok(())
}

async fn handle_df(cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(false, cancel, printer).await?;
    let usage = session
        .client
        .df()
        .await
        .context("Failed to get disk usage")?;
    println!("{}", output::df_table(usage));
    Ok(())
}

async fn handle_unload(
    args: UnloadArgs,
    cancel: &CancellationToken,
    printer: &Printer,
) -> Result<()> {
    if !args.all && args.models.is_empty() {
        bail!("specify --all or at least one model to unload");
    }
    let session = connect(false, cancel, printer).await?;
    let response = session
        .client
        .unload(UnloadRequest {
            all: args.all,
            backend: args.backend.unwrap_or_default(),
            models: args.models,
        })
        .await
        .context("Failed to unload models")?;
    if response.unloaded_runners == 0 {
        println!("No models were unloaded");
    } else {
        println!("Unloaded {} model runner(s)", response.unloaded_runners);
    }
    Ok(())
}

async fn handle_install_runner(cancel: &CancellationToken, printer: &Printer) -> Result<()> {
    let session = connect(true, cancel, printer)
        .await
        .context("unable to initialize standalone model runner")?;
    match session.client.context().kind() {
        EngineKind::Desktop => println!("Model Runner is built into Docker Desktop"),
        EngineKind::MobyManual => println!(
            "Model Runner endpoint is managed externally ({})",
            session.client.context().base_url()
        ),
        _ => println!("Docker Model Runner is installed and running"),
    }
    Ok(())
}

async fn handle_uninstall_runner(args: UninstallRunnerArgs, printer: &Printer) -> Result<()> {
    let docker = Docker::connect_with_local_defaults()
        .context("no usable container engine: cannot connect to the engine socket")?;
    standalone::prune_controller_containers(&docker, false, printer)
        .await
        .context("Failed to remove model runner containers")?;
    if args.models {
        match docker
            .remove_volume(
                standalone::MODEL_STORAGE_VOLUME,
                Some(RemoveVolumeOptions { force: true }),
            )
            .await
        {
            Ok(()) => printer(&format!(
                "Removed model storage volume {}",
                standalone::MODEL_STORAGE_VOLUME
            )),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(err) => return Err(err).context("Failed to remove model storage volume"),
        }
    }
    println!("Model Runner uninstalled");
    Ok(())
}

async fn handle_compose_up(args: ComposeUpArgs, cancel: &CancellationToken) -> Result<()> {
    if args.models.is_empty() {
        compose::send_error("options.model is required");
        bail!("options.model is required");
    }

    compose::send_info("Initializing model runner...");
    if args.context_size > 0 {
        compose::send_info(&format!("Setting context size to {}", args.context_size));
    }
    if !args.runtime_flags.is_empty() {
        compose::send_info(&format!(
            "Setting raw runtime flags to {}",
            args.runtime_flags
        ));
    }

    let session = match connect(true, cancel, &|message: &str| compose::send_info(message)).await {
        Ok(session) => session,
        Err(err) => {
            compose::send_error(&format!(
                "Failed to initialize standalone model runner: {err}"
            ));
            return Err(err);
        }
    };

    compose::pull_missing_models(&session.client, &args.models).await?;
    compose::configure_models(
        &session.client,
        &args.models,
        args.context_size,
        &args.runtime_flags,
    )
    .await?;

    let url = compose::consumer_url(session.client.context(), session.standalone.as_ref())?;
    compose::setenv("URL", &url);
    compose::setenv("MODEL", &args.models.join(","));
    Ok(())
}
