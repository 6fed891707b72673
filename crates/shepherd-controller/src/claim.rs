use std::collections::BTreeMap;
use std::time::Duration as StdDuration;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};
use shepherd_types::duration::{parse_duration, DEFAULT_RUNNER_TIMEOUT};
use shepherd_types::sandbox::{Lifecycle, SandboxClaim, SandboxClaimSpec, ShutdownPolicy, TemplateRef};
use shepherd_types::task_record::labels;
use shepherd_types::TaskRecord;

/// Builds the owner reference a child object needs to be garbage-collected
/// alongside its TaskRecord.
pub fn owner_reference(task: &TaskRecord) -> OwnerReference {
    OwnerReference {
        api_version: TaskRecord::api_version(&()).to_string(),
        kind: TaskRecord::kind(&()).to_string(),
        name: task.name_any(),
        uid: task.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Resolves `spec.runner.timeout`, falling back to the 30 minute default.
pub fn resolve_timeout(task: &TaskRecord) -> StdDuration {
    task.spec
        .runner
        .timeout
        .as_deref()
        .and_then(|raw| parse_duration(raw).ok())
        .unwrap_or(DEFAULT_RUNNER_TIMEOUT)
}

/// Produces the SandboxClaim for `task`, named after it, with a
/// Retain shutdown policy so the controller can observe terminal status
/// before the claim (and its sandbox) are cleaned up.
pub fn build_sandbox_claim(task: &TaskRecord) -> SandboxClaim {
    let timeout = resolve_timeout(task);
    let mut labels_map = BTreeMap::new();
    labels_map.insert(labels::TASK.to_string(), task.name_any());

    let mut claim = SandboxClaim::new(
        &task.name_any(),
        SandboxClaimSpec {
            template_ref: TemplateRef {
                name: task.spec.runner.sandbox_template_name.clone(),
            },
            lifecycle: Lifecycle {
                shutdown_time: Utc::now() + chrono::Duration::from_std(timeout).unwrap_or_default(),
                shutdown_policy: ShutdownPolicy::Retain,
            },
        },
    );
    claim.metadata.namespace = task.namespace();
    claim.metadata.labels = Some(labels_map);
    claim.metadata.owner_references = Some(vec![owner_reference(task)]);
    claim
}

#[cfg(test)]
mod tests {
    use super::*;
    use shepherd_types::task_record::{CallbackRef, RepoRef, RunnerConfig, TaskDescription};
    use shepherd_types::TaskRecordSpec;

    fn sample_task(timeout: Option<&str>) -> TaskRecord {
        let spec = TaskRecordSpec {
            repo: RepoRef { url: "https://github.com/acme/widgets".to_string(), git_ref: None },
            task: TaskDescription {
                description: "fix the bug".to_string(),
                context: None,
                context_encoding: None,
                source_url: None,
                source_type: None,
                source_id: None,
            },
            callback: CallbackRef { url: "https://adapter.example/callback".to_string() },
            runner: RunnerConfig {
                sandbox_template_name: "default".to_string(),
                timeout: timeout.map(str::to_string),
                service_account_name: None,
            },
        };
        let mut task = TaskRecord::new("task-abc123", spec);
        task.metadata.namespace = Some("shepherd".to_string());
        task.metadata.uid = Some("11111111-1111-1111-1111-111111111111".to_string());
        task
    }

    #[test]
    fn resolve_timeout_falls_back_to_default_when_unset() {
        let task = sample_task(None);
        assert_eq!(resolve_timeout(&task), DEFAULT_RUNNER_TIMEOUT);
    }

    #[test]
    fn resolve_timeout_parses_a_valid_spec_value() {
        let task = sample_task(Some("45m"));
        assert_eq!(resolve_timeout(&task), StdDuration::from_secs(45 * 60));
    }

    #[test]
    fn resolve_timeout_falls_back_on_malformed_spec_value() {
        let task = sample_task(Some("not-a-duration"));
        assert_eq!(resolve_timeout(&task), DEFAULT_RUNNER_TIMEOUT);
    }

    #[test]
    fn build_sandbox_claim_carries_name_namespace_labels_and_owner() {
        let task = sample_task(Some("10m"));
        let claim = build_sandbox_claim(&task);

        assert_eq!(claim.name_any(), "task-abc123");
        assert_eq!(claim.metadata.namespace.as_deref(), Some("shepherd"));
        assert_eq!(claim.spec.template_ref.name, "default");
        assert_eq!(claim.spec.lifecycle.shutdown_policy, ShutdownPolicy::Retain);

        let labels = claim.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(labels::TASK).map(String::as_str), Some("task-abc123"));

        let owners = claim.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].name, "task-abc123");
        assert_eq!(owners[0].uid, "11111111-1111-1111-1111-111111111111");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[test]
    fn owner_reference_points_back_at_the_task() {
        let task = sample_task(None);
        let owner = owner_reference(&task);
        assert_eq!(owner.kind, "TaskRecord");
        assert_eq!(owner.name, "task-abc123");
        assert_eq!(owner.block_owner_deletion, Some(true));
    }
}
