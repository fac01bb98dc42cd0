use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fluent_postproc::api;
use fluent_postproc::config::PipelineConfig;
use fluent_postproc::executor::resolve_solver_path;
use fluent_postproc::pipeline::PostProcessor;
use fluent_postproc::session::PostProcessingSession;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fluent_postproc=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Fluent Post-Processing Service");

    let config_path = std::env::var("POSTPROC_CONFIG").ok().map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref())?;

    // The solver runs from the case folder, so report the absolute path it will use.
    let solver = resolve_solver_path(&config.solver);
    tracing::info!("Using solver command: {}", solver.display());
    if !solver.is_file() {
        tracing::warn!("Solver not found at {}", solver.display());
        tracing::warn!("Set FLUENT_PATH environment variable to the correct path");
        tracing::warn!("Service will start but runs will fail until the solver is available");
    }
    if !config.template.master.is_file() {
        tracing::warn!("Force sheet template not found at {:?}", config.template.master);
    }

    let session = Arc::new(PostProcessingSession::new(PostProcessor::new(Arc::new(config))));
    let app = api::create_router(session);

    // Bind to address
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT").unwrap_or_else(|_| "8084".to_string());
    let addr = format!("{}:{}", host, port);

    tracing::info!("Listening on {}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  GET  /health");
    tracing::info!("  GET  /api/v1/version");
    tracing::info!("  POST /api/v1/cases");
    tracing::info!("  POST /api/v1/runs");
    tracing::info!("  GET  /api/v1/runs/:id");
    tracing::info!("  POST /api/v1/runs/:id/cancel");
    tracing::info!("  GET  /api/v1/images");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
