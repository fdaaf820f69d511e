use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chunkwise_core::{
    create_event_system, generation::LlmServiceConfig, load_config, validate_config,
    AnthropicClient, Config, EventStore, GenerationService, LlmGenerationService, LlmProvider,
    OllamaClient, PipelineCoordinator, SessionStore, SqliteEventStore, SqliteSessionStore,
};

use chunkwise_server::{api::create_router, state::AppState};

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for the pipeline event channel
const EVENT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("CHUNKWISE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = VERSION,
        config_hash = &config_hash[..16],
        database = ?config.database.path,
        "Configuration loaded"
    );

    let session_store: Arc<dyn SessionStore> = Arc::new(
        SqliteSessionStore::new(&config.database.path)
            .context("Failed to create session store")?,
    );
    let event_store: Arc<dyn EventStore> = Arc::new(
        SqliteEventStore::new(&config.database.path).context("Failed to create event store")?,
    );
    info!("Stores initialized");

    let (event_handle, event_writer) =
        create_event_system(Arc::clone(&event_store), EVENT_BUFFER_SIZE);
    let writer_handle = tokio::spawn(event_writer.run());

    let service = create_generation_service(&config)?;
    info!(backend = service.name(), "Generation backend ready");

    let coordinator = Arc::new(
        PipelineCoordinator::new(session_store, service, config.pipeline.clone())
            .with_events(event_handle),
    );

    let state = Arc::new(AppState::new(config.clone(), coordinator, event_store));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // The router (and with it the coordinator's event handle) is dropped
    // when serving ends, which lets the writer drain and exit.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    let _ = writer_handle.await;
    info!("Event writer stopped");

    Ok(())
}

/// Build the generation backend selected by `[llm]`.
fn create_generation_service(config: &Config) -> Result<Arc<dyn GenerationService>> {
    let Some(llm) = &config.llm else {
        bail!("No [llm] section configured; a generation backend is required");
    };

    let service_config = LlmServiceConfig {
        max_tokens: llm.max_tokens,
        ..Default::default()
    };
    let timeout = Duration::from_secs(llm.timeout_secs);

    let service: Arc<dyn GenerationService> = match llm.provider {
        LlmProvider::Anthropic => {
            let api_key = llm
                .api_key
                .clone()
                .context("Anthropic provider requires api_key")?;
            let mut client = AnthropicClient::new(api_key, &llm.model).with_timeout(timeout);
            if let Some(api_base) = &llm.api_base {
                client = client.with_api_base(api_base);
            }
            info!(model = %llm.model, "Using Anthropic backend");
            Arc::new(LlmGenerationService::with_config(
                Arc::new(client),
                service_config,
            ))
        }
        LlmProvider::Ollama => {
            let mut client = OllamaClient::new(&llm.model).with_timeout(timeout);
            if let Some(api_base) = &llm.api_base {
                client = client.with_api_base(api_base);
            }
            info!(model = %llm.model, "Using Ollama backend");
            Arc::new(LlmGenerationService::with_config(
                Arc::new(client),
                service_config,
            ))
        }
    };

    Ok(service)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
