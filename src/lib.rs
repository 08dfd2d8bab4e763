pub mod capability;
pub mod config;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod perception;

pub use capability::CapabilityProvider;
pub use decision::{DecisionService, HttpDecisionClient};
pub use engine::{Notice, NoticeLevel, NoticeSender, Orchestrator, Session, TaskInput};
pub use errors::{AgentError, AgentResult};

/// Initializes tracing (env-filtered, defaulting to `info`) and loads a
/// `.env` file if one is present. Host applications call this once at
/// startup before building an [`Orchestrator`].
pub fn init_telemetry() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
}

use std::sync::Arc;
use std::time::Duration;

/// Builds an orchestrator wired to the HTTP decision client described by the
/// config file, leaving only the capability provider to the caller.
pub fn build_orchestrator(
    config: &config::AppConfig,
    provider: Arc<dyn CapabilityProvider>,
    notices: NoticeSender,
) -> AgentResult<Orchestrator> {
    let endpoint = config.decision_endpoint()?;
    let client = HttpDecisionClient::new(
        endpoint,
        Duration::from_secs(config.decision.timeout_secs),
    )?;
    Ok(Orchestrator::new(
        Session::new(),
        provider,
        Arc::new(client),
        config.safety.clone(),
        config.timing.clone(),
        notices,
    ))
}
