pub mod chat;
pub mod cli;
pub mod compose;
pub mod engine;
pub mod progress;
pub mod runner;
pub mod standalone;

pub use chat::{History, MAX_HISTORY_LENGTH};
pub use engine::{EngineKind, EnvSnapshot, ModelRunnerContext, ResolveError};
pub use progress::PullProgress;
pub use runner::{ClientError, RunnerClient};
pub use standalone::{StandaloneRunner, CONTROLLER_CONTAINER_NAME};

pub fn init_default() {
    use std::sync::Once;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::from_default_env()
            .add_directive("model_cli=info".parse().unwrap())
            .add_directive("h2=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    });
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_exists() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name_is_model_cli() {
        assert_eq!(NAME, "model-cli");
    }
}
