use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client};
use serde_json::json;

/// Acquires and renews a single well-known `Lease` so only one controller
/// replica reconciles at a time. No dedicated leader-election crate exists in
/// this stack, so this reaches for the Kubernetes primitive directly, the
/// same move the owner-reference and CRD-registration code makes elsewhere
/// in this crate.
pub struct LeaderElector {
    api: Api<Lease>,
    name: String,
    identity: String,
    duration_secs: i64,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, name: &str, identity: String, duration_secs: i64) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
            identity,
            duration_secs,
        }
    }

    /// Attempts to acquire the lease if unheld or expired, or renews it if
    /// this identity already holds it. Returns whether this process is
    /// leader after the attempt.
    pub async fn try_acquire_or_renew(&self) -> bool {
        match self.api.get_opt(&self.name).await {
            Ok(None) => self.create().await,
            Ok(Some(lease)) => self.renew_or_takeover(lease).await,
            Err(err) => {
                tracing::warn!(error = %err, "lease lookup failed");
                false
            }
        }
    }

    async fn create(&self) -> bool {
        let lease = Lease {
            metadata: kube::api::ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(self.duration_secs as i32),
                acquire_time: Some(MicroTime(Utc::now())),
                renew_time: Some(MicroTime(Utc::now())),
                lease_transitions: Some(0),
                ..Default::default()
            }),
        };
        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => true,
            Err(kube::Error::Api(err)) if err.code == 409 => false,
            Err(err) => {
                tracing::warn!(error = %err, "lease creation failed");
                false
            }
        }
    }

    async fn renew_or_takeover(&self, lease: Lease) -> bool {
        let spec = lease.spec.unwrap_or_default();
        let held_by_us = is_held_by(&spec, &self.identity);
        let expired = is_expired(&spec, self.duration_secs, Utc::now());

        if !held_by_us && !expired {
            return false;
        }

        let transitions = if held_by_us { spec.lease_transitions.unwrap_or(0) } else { spec.lease_transitions.unwrap_or(0) + 1 };
        let patch = json!({
            "spec": {
                "holderIdentity": self.identity,
                "leaseDurationSeconds": self.duration_secs,
                "renewTime": Utc::now().to_rfc3339(),
                "leaseTransitions": transitions,
            }
        });
        match self
            .api
            .patch(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(error = %err, "lease renew/takeover failed");
                false
            }
        }
    }
}

fn is_held_by(spec: &LeaseSpec, identity: &str) -> bool {
    spec.holder_identity.as_deref() == Some(identity)
}

fn is_expired(spec: &LeaseSpec, duration_secs: i64, now: chrono::DateTime<Utc>) -> bool {
    spec.renew_time
        .as_ref()
        .map(|t| now - t.0 > chrono::Duration::seconds(duration_secs))
        .unwrap_or(true)
}

/// Runs the acquire/renew loop forever at `duration_secs / 3` cadence,
/// keeping `leader` up to date for the reconcile loop to read.
pub async fn run(elector: Arc<LeaderElector>, leader: Arc<AtomicBool>, duration_secs: i64) {
    let interval = std::time::Duration::from_secs((duration_secs / 3).max(1) as u64);
    loop {
        let is_leader = elector.try_acquire_or_renew().await;
        leader.store(is_leader, Ordering::SeqCst);
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(holder: Option<&str>, renewed_secs_ago: i64) -> LeaseSpec {
        LeaseSpec {
            holder_identity: holder.map(str::to_string),
            lease_duration_seconds: Some(15),
            renew_time: Some(MicroTime(Utc::now() - chrono::Duration::seconds(renewed_secs_ago))),
            lease_transitions: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn is_held_by_matches_identity_only() {
        assert!(is_held_by(&spec(Some("replica-a"), 1), "replica-a"));
        assert!(!is_held_by(&spec(Some("replica-b"), 1), "replica-a"));
        assert!(!is_held_by(&spec(None, 1), "replica-a"));
    }

    #[test]
    fn is_expired_when_renew_time_older_than_duration() {
        let now = Utc::now();
        assert!(!is_expired(&spec(Some("replica-a"), 5), 15, now));
        assert!(is_expired(&spec(Some("replica-a"), 30), 15, now));
    }

    #[test]
    fn missing_renew_time_counts_as_expired() {
        let spec = LeaseSpec { holder_identity: Some("replica-a".to_string()), ..Default::default() };
        assert!(is_expired(&spec, 15, Utc::now()));
    }
}
