use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Manage and run local LLMs through the Model Runner service
#[derive(Parser, Debug)]
#[command(
    name = "model-cli",
    about = "Manage and run local LLMs through the Model Runner service",
    version,
    long_about = "model-cli pulls models packaged as OCI artifacts, stores them locally, \
                  loads them into an inference backend on demand, and proxies chat and \
                  completion requests. It works against Docker Desktop's integrated runner, \
                  a standalone runner container on plain engines, and cloud engines."
)]
pub struct CliArgs {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    /// Enable verbose output (equivalent to --log-level debug)
    #[arg(short = 'v', long, global = true, help = "Increase verbosity")]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show whether the Model Runner is running
    Status,

    /// Pull a model from Docker Hub or HuggingFace to your local environment
    Pull(PullArgs),

    /// Push a model to the registry
    Push(PushArgs),

    /// List the models pulled to your local environment
    #[command(alias = "ls")]
    List(ListArgs),

    /// Display detailed information on one model
    Inspect(InspectArgs),

    /// Run a model and interact with it using a submitted prompt or chat mode
    #[command(
        long_about = "Run a model with a one-shot prompt, piped stdin, or an interactive \
                      chat session.\n\n\
                      Examples:\n  \
                      model-cli run ai/smollm2\n  \
                      model-cli run ai/smollm2 \"Tell me a joke\"\n  \
                      echo \"Tell me a joke\" | model-cli run ai/smollm2"
    )]
    Run(RunArgs),

    /// Remove models from your local environment
    #[command(name = "rm")]
    Remove(RemoveArgs),

    /// Tag a model with a new reference
    Tag(TagArgs),

    /// Load a model tarball into the runner's store
    Load(LoadArgs),

    /// List running models
    Ps,

    /// Show Model Runner disk usage
    Df,

    /// Unload running models
    Unload(UnloadArgs),

    /// Install the standalone Model Runner container
    InstallRunner,

    /// Remove the standalone Model Runner container
    UninstallRunner(UninstallRunnerArgs),

    /// Hook for compose-managed model provisioning
    #[command(subcommand, hide = true)]
    Compose(ComposeCommands),
}

#[derive(Parser, Debug, Clone)]
pub struct PullArgs {
    /// Model reference (tag or digest)
    #[arg(value_name = "MODEL")]
    pub model: String,

    /// Do not block pull if estimated runtime memory for model exceeds system resources
    #[arg(long)]
    pub ignore_runtime_memory_check: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct PushArgs {
    /// Model reference (tag or digest)
    #[arg(value_name = "MODEL")]
    pub model: String,
}

#[derive(Parser, Debug, Clone)]
pub struct ListArgs {
    /// List models in OpenAI format
    #[arg(long)]
    pub openai: bool,

    /// Backend whose models to list (with --openai)
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct InspectArgs {
    /// Model reference or ID
    #[arg(value_name = "MODEL")]
    pub model: String,

    /// Query the registry instead of the local store
    #[arg(long)]
    pub remote: bool,

    /// Inspect in OpenAI format
    #[arg(long)]
    pub openai: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Model reference or ID
    #[arg(value_name = "MODEL")]
    pub model: String,

    /// One-shot prompt; omit for interactive chat mode
    #[arg(value_name = "PROMPT")]
    pub prompt: Vec<String>,

    /// Inference backend to use
    #[arg(long, hide = true, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Enable debug logging for this run
    #[arg(long)]
    pub debug: bool,

    /// Do not block pull if estimated runtime memory for model exceeds system resources
    #[arg(long)]
    pub ignore_runtime_memory_check: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RemoveArgs {
    /// Model references or IDs
    #[arg(value_name = "MODEL", required = true)]
    pub models: Vec<String>,

    /// Forcefully remove the model
    #[arg(short = 'f', long)]
    pub force: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct TagArgs {
    /// Source model reference or ID
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Target reference (REPOSITORY[:TAG])
    #[arg(value_name = "TARGET")]
    pub target: String,
}

#[derive(Parser, Debug, Clone)]
pub struct LoadArgs {
    /// Path to the model tarball, or - for stdin
    #[arg(value_name = "PATH")]
    pub path: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct UnloadArgs {
    /// Unload all running models
    #[arg(long)]
    pub all: bool,

    /// Backend to unload from
    #[arg(long, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Models to unload
    #[arg(value_name = "MODEL")]
    pub models: Vec<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct UninstallRunnerArgs {
    /// Also remove the model storage volume
    #[arg(long)]
    pub models: bool,
}

#[derive(Subcommand, Debug)]
pub enum ComposeCommands {
    /// Provision models for a compose service
    Up(ComposeUpArgs),
    /// Tear down compose-managed models (no-op)
    Down(ComposeDownArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct ComposeUpArgs {
    /// Model to use
    #[arg(long = "model", value_name = "MODEL")]
    pub models: Vec<String>,

    /// Context size for the model; -1 leaves the backend default
    #[arg(
        long = "context-size",
        value_name = "N",
        default_value_t = -1,
        allow_hyphen_values = true
    )]
    pub context_size: i64,

    /// Raw runtime flags to pass to the inference engine
    #[arg(long = "runtime-flags", value_name = "FLAGS", default_value = "")]
    pub runtime_flags: String,

    /// Inference backend to use
    #[arg(long, value_name = "BACKEND", default_value = "llama.cpp")]
    pub backend: String,

    /// Compose project name (unused)
    #[arg(long = "project-name", value_name = "NAME")]
    pub project_name: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ComposeDownArgs {
    /// Model to use
    #[arg(long = "model", value_name = "MODEL")]
    pub models: Vec<String>,

    /// Compose project name (unused)
    #[arg(long = "project-name", value_name = "NAME")]
    pub project_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn pull_takes_a_model_and_memory_flag() {
        let args = CliArgs::parse_from([
            "model-cli",
            "pull",
            "ai/smollm2",
            "--ignore-runtime-memory-check",
        ]);
        match args.command {
            Commands::Pull(pull) => {
                assert_eq!(pull.model, "ai/smollm2");
                assert!(pull.ignore_runtime_memory_check);
            }
            _ => panic!("Expected Pull command"),
        }
    }

    #[test]
    fn run_collects_trailing_prompt_words() {
        let args =
            CliArgs::parse_from(["model-cli", "run", "ai/smollm2", "tell", "me", "a", "joke"]);
        match args.command {
            Commands::Run(run) => {
                assert_eq!(run.model, "ai/smollm2");
                assert_eq!(run.prompt, vec!["tell", "me", "a", "joke"]);
                assert!(run.backend.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn rm_requires_at_least_one_model() {
        assert!(CliArgs::try_parse_from(["model-cli", "rm"]).is_err());
        let args = CliArgs::parse_from(["model-cli", "rm", "-f", "a/b", "c/d"]);
        match args.command {
            Commands::Remove(remove) => {
                assert!(remove.force);
                assert_eq!(remove.models, vec!["a/b", "c/d"]);
            }
            _ => panic!("Expected Remove command"),
        }
    }

    #[test]
    fn ls_is_an_alias_for_list() {
        let args = CliArgs::parse_from(["model-cli", "ls", "--openai"]);
        match args.command {
            Commands::List(list) => assert!(list.openai),
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn compose_up_accepts_repeated_models_and_negative_context() {
        let args = CliArgs::parse_from([
            "model-cli",
            "compose",
            "up",
            "--model",
            "ai/smollm2",
            "--model",
            "ai/qwen3",
            "--context-size",
            "-1",
        ]);
        match args.command {
            Commands::Compose(ComposeCommands::Up(up)) => {
                assert_eq!(up.models, vec!["ai/smollm2", "ai/qwen3"]);
                assert_eq!(up.context_size, -1);
                assert_eq!(up.backend, "llama.cpp");
            }
            _ => panic!("Expected Compose Up command"),
        }
    }

    #[test]
    fn global_flags_apply_before_and_after_subcommand() {
        let args = CliArgs::parse_from(["model-cli", "-v", "ps"]);
        assert!(args.verbose);
        let args = CliArgs::parse_from(["model-cli", "status", "--log-level", "debug"]);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }
}
