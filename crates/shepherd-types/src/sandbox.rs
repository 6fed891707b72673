use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// A request for a sandbox pod, owned by a TaskRecord and reconciled by a
/// third-party provisioner (out of scope here). Only the fields this system
/// reads or writes are modelled; the provisioner's own schema may carry more.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sandbox.shepherd.io",
    version = "v1alpha1",
    kind = "SandboxClaim",
    plural = "sandboxclaims",
    shortname = "sbc",
    status = "SandboxClaimStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SandboxClaimSpec {
    pub template_ref: TemplateRef,
    pub lifecycle: Lifecycle,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Lifecycle {
    #[schemars(with = "String")]
    pub shutdown_time: DateTime<Utc>,
    pub shutdown_policy: ShutdownPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ShutdownPolicy {
    Retain,
    Delete,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SandboxClaimStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_status: Option<SandboxStatusRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatusRef {
    pub name: String,
}

pub const READY: &str = "Ready";

pub mod ready_reason {
    pub const SANDBOX_EXPIRED: &str = "SandboxExpired";
    pub const CLAIM_EXPIRED: &str = "ClaimExpired";
}

/// The materialised pod handle; status exposes the service FQDN the
/// controller addresses the runner's HTTP endpoint through.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "sandbox.shepherd.io",
    version = "v1alpha1",
    kind = "Sandbox",
    plural = "sandboxes",
    shortname = "sbx",
    status = "SandboxStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SandboxSpec {}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SandboxStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_fqdn: Option<String>,
}

/// Maps a SandboxClaim's terminal `Ready` condition reason to a `Succeeded`
/// failure reason. No separate OOM classification — intentionally simplified,
/// since pod-level introspection is out of scope.
pub fn classify_failure_reason(ready_condition_reason: Option<&str>) -> &'static str {
    match ready_condition_reason {
        Some(ready_reason::SANDBOX_EXPIRED) | Some(ready_reason::CLAIM_EXPIRED) => "TimedOut",
        _ => "Failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_reasons_map_to_timed_out() {
        assert_eq!(classify_failure_reason(Some(ready_reason::SANDBOX_EXPIRED)), "TimedOut");
        assert_eq!(classify_failure_reason(Some(ready_reason::CLAIM_EXPIRED)), "TimedOut");
    }

    #[test]
    fn other_reasons_map_to_failed() {
        assert_eq!(classify_failure_reason(Some("NodeEvicted")), "Failed");
        assert_eq!(classify_failure_reason(None), "Failed");
    }
}
