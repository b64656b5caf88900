mod config;
mod error;
mod export;
mod routes;
mod sessions;

use std::sync::Arc;
use std::time::Duration;

use config::AppConfig;
use error::StartupError;
use export::ProjectExporter;
use instantcoder_engine::MessageFormatter;
use instantcoder_inference::BackendRegistry;
use routes::AppState;
use sessions::SessionManager;

/// How often idle sessions are swept
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    // Initialize logging - override with RUST_LOG
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    log::info!("InstantCoder starting...");

    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), StartupError> {
    let data_dir = config::data_dir();
    let first_run = !data_dir.join(config::CONFIG_FILE).exists();
    let mut config = AppConfig::load(&data_dir).await?;
    if first_run {
        if let Err(e) = config.save(&data_dir).await {
            log::warn!("Could not write default configuration: {}", e);
        }
    }
    config.apply_env_overrides();

    let registry = BackendRegistry::new();
    log::info!("Available backends: {:?}", registry.available_names());
    let backend = registry.create(&config.backend.name, &config.backend_config())?;
    if !backend.health_check().await {
        log::warn!(
            "{} backend at {} is not reachable yet; generations will fail until it is",
            backend.name(),
            backend.base_url()
        );
    }

    let default_model = config
        .default_model()
        .ok_or(StartupError::NoModel)?
        .to_string();

    let formatter = match &config.system_prompt {
        Some(prompt) => {
            log::info!("Using system prompt override from configuration");
            MessageFormatter::new(prompt.as_str())
        }
        None => MessageFormatter::default(),
    };

    let sessions = Arc::new(
        SessionManager::new(backend, default_model.as_str(), config.session_idle_timeout())
            .with_formatter(formatter),
    );

    let export_root = config.export_root()?;
    let exporter =
        ProjectExporter::new(export_root).with_exclusions(&config.export.extra_exclusions);

    // Sweep idle sessions in the background
    let sweeper = Arc::clone(&sessions);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper.cleanup_stale().await;
            if removed > 0 {
                log::info!("Removed {} idle sessions", removed);
            }
        }
    });

    let listen = config.listen.clone();
    log::info!(
        "Default model '{}', sessions expire after {:?} idle",
        default_model,
        sessions.stale_timeout()
    );

    let state = Arc::new(AppState {
        sessions,
        config,
        exporter,
    });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    log::info!("InstantCoder listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("InstantCoder stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}
