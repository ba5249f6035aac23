use jellymux::api::{ApiServer, ApiServerConfig, AppState};
use jellymux::config::AppConfig;
use jellymux::services::ServiceContainer;
use jellymux::{database, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    let _log_guard = logging::init_logging(&config.log_dir)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        root = %config.scan_root.display(),
        "Starting jellymux"
    );

    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let mut services = ServiceContainer::new(pool, &config);
    services.initialize().await?;

    let cancel_token = services.cancellation_token();
    logging::start_retention_cleanup(config.log_dir.clone(), cancel_token.clone());

    let api = ApiServer::new(
        ApiServerConfig::from(&config),
        AppState::new(services.media_files.clone(), config.scan_root.clone()),
        cancel_token.clone(),
    );
    let mut api_task = tokio::spawn(async move { api.run().await });

    let stopped = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Received Ctrl+C, shutting down");
            None
        }
        result = &mut api_task => {
            tracing::error!("API server stopped unexpectedly, shutting down");
            Some(result)
        }
    };

    cancel_token.cancel();
    let api_result = match stopped {
        Some(result) => result,
        None => api_task.await,
    };

    services.shutdown().await?;
    match api_result {
        Ok(Err(e)) => tracing::error!("API server error: {}", e),
        Err(e) => tracing::error!("API server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    tracing::info!("jellymux stopped");
    Ok(())
}
