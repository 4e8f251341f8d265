use std::net::SocketAddr;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use storekeep_core::AppConfig;
use storekeep_service::{router, AppState};
use storekeep_workflow::Workspace;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing();
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address {}", config.bind_addr))?;
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("failed to create {}", config.upload_dir.display()))?;
    info!(
        data_dir = %config.data_dir.display(),
        upload_dir = %config.upload_dir.display(),
        model = %config.model,
        "starting storekeep service"
    );
    let app = router(AppState::new(Workspace::new(config)));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
