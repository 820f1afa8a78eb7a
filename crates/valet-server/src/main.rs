//! valet server binary.

mod api;

use anyhow::{anyhow, Context};
use api::AppState;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use valet_application::{
    AgenticExecutor, Classifier, OperationDispatcher, PromptEngine, WorkflowOrchestrator,
};
use valet_core::config::ValetConfig;
use valet_core::event_bus::OperationEventBus;
use valet_core::operation::{OperationDefinition, OperationRegistry};
use valet_infrastructure::{
    built_in_definitions, built_in_handlers, ConfigService, FileMemoryStore,
    FileProfileRepository, FileSessionRepository, SecretStorage, ValetPaths,
};
use valet_interaction::build_role_chains;

#[derive(Parser)]
#[command(name = "valet", about = "Personal AI-assistant workflow backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Path to config.toml (defaults to the platform config dir).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the bind address from config.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Validate configuration, registry, and LLM role chains, then exit.
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config, bind } => serve(config, bind).await,
        Command::CheckConfig { config } => check_config(config).await,
    }
}

fn config_service(config_override: Option<PathBuf>, paths: &ValetPaths) -> ConfigService {
    match config_override {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new(paths),
    }
}

/// Config-defined operations win over built-ins with the same name.
fn merged_definitions(config: &ValetConfig) -> Vec<OperationDefinition> {
    let mut defs = config.operations.clone();
    for builtin in built_in_definitions() {
        if !defs.iter().any(|d| d.name == builtin.name) {
            defs.push(builtin);
        }
    }
    defs
}

fn workspace_root(config: &ValetConfig) -> PathBuf {
    match &config.server.workspace_root {
        Some(root) => PathBuf::from(root),
        None => dirs::data_dir()
            .map(|d| d.join("valet").join("workspace"))
            .unwrap_or_else(|| PathBuf::from(".")),
    }
}

async fn serve(config_override: Option<PathBuf>, bind_override: Option<String>) -> anyhow::Result<()> {
    let paths = ValetPaths::resolve()?;
    let config = config_service(config_override, &paths)
        .load_or_init()
        .await
        .context("failed to load configuration")?;
    let secrets = SecretStorage::new(&paths)
        .load()
        .await
        .context("failed to load secrets")?;

    let registry = Arc::new(
        OperationRegistry::new(merged_definitions(&config))
            .map_err(|err| anyhow!("invalid operation registry: {err}"))?,
    );
    let chains = build_role_chains(&config.llm, &secrets)?;

    let bus = Arc::new(OperationEventBus::new());
    let prompts = Arc::new(PromptEngine::new()?);
    let sessions = Arc::new(FileSessionRepository::new(paths.sessions_dir()).await?);
    let profiles = Arc::new(FileProfileRepository::new(paths.profile_file()));
    let memory = Arc::new(FileMemoryStore::new(paths.memory_file()));

    let classifier = Arc::new(Classifier::new(
        prompts.clone(),
        Arc::new(chains.classifier),
        Arc::new(chains.summarizer),
        config.history.window_turns,
        config.history.summary_trigger_chars,
    ));
    let dispatcher = Arc::new(OperationDispatcher::new(
        built_in_handlers(workspace_root(&config)),
        bus.clone(),
        Duration::from_secs(config.dispatch.operation_timeout_secs),
    ));
    let executor = Arc::new(AgenticExecutor::new(
        registry.clone(),
        dispatcher,
        bus.clone(),
        Arc::new(chains.synthesizer),
        prompts,
        memory.clone(),
    ));
    let orchestrator = Arc::new(WorkflowOrchestrator::new(
        sessions.clone(),
        profiles,
        memory,
        registry,
        bus.clone(),
        classifier,
        executor,
    ));

    let state = AppState {
        orchestrator,
        bus,
        sessions,
    };
    let app = api::build_router(state);

    let bind = bind_override.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(target: "valet::server", bind = %bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn check_config(config_override: Option<PathBuf>) -> anyhow::Result<()> {
    let paths = ValetPaths::resolve()?;
    let service = config_service(config_override, &paths);
    let config = service
        .load_strict()
        .await
        .with_context(|| format!("cannot read {}", service.config_path().display()))?;
    println!("config: {} ok", service.config_path().display());

    let registry = OperationRegistry::new(merged_definitions(&config))
        .map_err(|err| anyhow!("invalid operation registry: {err}"))?;
    println!("registry: {} operations", registry.len());

    let secrets = SecretStorage::new(&paths).load().await?;
    let chains = build_role_chains(&config.llm, &secrets)?;
    for chain in [&chains.classifier, &chains.synthesizer, &chains.summarizer] {
        println!(
            "llm role {}: {}",
            chain.role(),
            chain.backend_names().join(" -> ")
        );
    }
    println!("ok");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // Without a signal handler the server just runs until killed.
        std::future::pending::<()>().await;
    }
}
