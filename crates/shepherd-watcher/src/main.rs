use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::Api;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shepherd_types::TaskRecord;
use shepherd_watcher::config::WatcherConfig;
use shepherd_watcher::{error_policy, reconcile, Context};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = WatcherConfig::from_env();
    let client = kube::Client::try_default().await?;
    let tasks: Api<TaskRecord> = Api::namespaced(client.clone(), &config.namespace);

    let ctx = Arc::new(Context {
        client: client.clone(),
        http: reqwest::Client::new(),
        config,
    });

    info!("shepherd-watcher starting terminal-notification watch loop");

    Controller::new(tasks, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(key) => tracing::debug!(?key, "observed"),
                Err(err) => warn!(error = %err, "watch stream error"),
            }
        })
        .await;

    Ok(())
}
