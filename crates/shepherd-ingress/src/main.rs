use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shepherd_ingress::config::IngressConfig;
use shepherd_ingress::state::AppState;
use shepherd_ingress::{internal_router, public_router};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = IngressConfig::from_env();
    let client = kube::Client::try_default().await?;
    let state = AppState::new(client, config.clone());

    let public_listener = TcpListener::bind(&config.public_addr).await?;
    let internal_listener = TcpListener::bind(&config.internal_addr).await?;
    info!(public_addr = %config.public_addr, internal_addr = %config.internal_addr, "listening");

    let public = axum::serve(public_listener, public_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let internal = axum::serve(internal_listener, internal_router(state))
        .with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(public, internal)?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
