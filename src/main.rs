use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use store_uptime::api::{self, ApiState};
use store_uptime::config;
use store_uptime::ingest::CsvDataSource;
use store_uptime::jobs::{JobContext, ReportRegistry};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "store-uptime starting"
    );

    let options = config.engine_options()?;
    let source = CsvDataSource::new(
        config.observations_path(),
        config.schedules_path(),
        config.timezones_path(),
    );
    tracing::info!(
        observations = %config.observations_path().display(),
        schedules = %config.schedules_path().display(),
        timezones = %config.timezones_path().display(),
        default_zone = %options.default_zone,
        "Data sources configured"
    );

    let registry = Arc::new(RwLock::new(ReportRegistry::new()));
    let context = Arc::new(JobContext {
        source: Arc::new(source),
        options,
        output_dir: config.output_dir(),
        snapshot_mode: config.snapshot_mode(),
    });
    let app = api::router(ApiState {
        registry: Arc::clone(&registry),
        context,
    });

    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&registry)))
        .await?;

    tracing::info!("store-uptime stopped");
    Ok(())
}

/// Resolves on ctrl-c after flagging every unfinished report for cancellation.
async fn shutdown_signal(registry: Arc<RwLock<ReportRegistry>>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    match registry.read() {
        Ok(guard) => {
            tracing::info!(reports = guard.len(), "Shutdown requested, cancelling running reports");
            guard.cancel_all();
        }
        Err(_) => tracing::warn!("Registry lock poisoned during shutdown"),
    }
}
