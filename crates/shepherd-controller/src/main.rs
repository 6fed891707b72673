use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::runtime::Controller;
use kube::Api;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use shepherd_controller::config::ControllerConfig;
use shepherd_controller::lease::{self, LeaderElector};
use shepherd_controller::{error_policy, reconcile, Context};
use shepherd_types::{SandboxClaim, TaskRecord};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ControllerConfig::from_env();
    let client = kube::Client::try_default().await?;
    let is_leader = Arc::new(AtomicBool::new(!config.leader_election_enabled));

    if config.leader_election_enabled {
        let identity = format!("{}-{}", hostname(), Uuid::new_v4());
        let elector = Arc::new(LeaderElector::new(
            client.clone(),
            &config.namespace,
            &config.lease_name,
            identity,
            config.lease_duration_secs,
        ));
        let leader_flag = is_leader.clone();
        let duration = config.lease_duration_secs;
        tokio::spawn(async move {
            lease::run(elector, leader_flag, duration).await;
        });
    }

    let tasks: Api<TaskRecord> = Api::namespaced(client.clone(), &config.namespace);
    let claims: Api<SandboxClaim> = Api::namespaced(client.clone(), &config.namespace);

    let ctx = Arc::new(Context {
        client: client.clone(),
        http: reqwest::Client::new(),
        config,
        is_leader,
    });

    info!("shepherd-controller starting reconcile loop");

    Controller::new(tasks, watcher::Config::default())
        .owns(claims, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok(key) => tracing::debug!(?key, "reconciled"),
                Err(err) => warn!(error = %err, "reconcile stream error"),
            }
        })
        .await;

    Ok(())
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "shepherd-controller".to_string())
}
