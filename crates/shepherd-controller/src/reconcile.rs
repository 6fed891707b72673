use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use chrono::Utc;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams, PropagationPolicy};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use shepherd_types::condition::{self, reason, ConditionStatus};
use shepherd_types::sandbox::{classify_failure_reason, SandboxClaim, READY};
use shepherd_types::{Condition, TaskRecord};

use crate::assign::{assign_runner, AssignOutcome};
use crate::claim::{build_sandbox_claim, resolve_timeout};
use crate::config::ControllerConfig;
use crate::error::ReconcileError;
use crate::token::mint_and_store_token;

pub struct Context {
    pub client: Client,
    pub http: reqwest::Client,
    pub config: ControllerConfig,
    pub is_leader: Arc<AtomicBool>,
}

pub fn error_policy(_task: Arc<TaskRecord>, err: &ReconcileError, _ctx: Arc<Context>) -> Action {
    tracing::warn!(error = %err, "reconcile failed");
    Action::requeue(StdDuration::from_secs(15))
}

pub async fn reconcile(task: Arc<TaskRecord>, ctx: Arc<Context>) -> Result<Action, ReconcileError> {
    if ctx.config.leader_election_enabled && !ctx.is_leader.load(Ordering::SeqCst) {
        return Ok(Action::requeue(StdDuration::from_secs(5)));
    }

    let namespace = task.namespace().unwrap_or_default();
    let tasks: Api<TaskRecord> = Api::namespaced(ctx.client.clone(), &namespace);
    let claims: Api<SandboxClaim> = Api::namespaced(ctx.client.clone(), &namespace);

    // Step 1 (fetch) is performed by the watch machinery; a 404 here simply
    // means the object is already gone.
    let Some(current) = tasks.get_opt(&task.name_any()).await? else {
        return Ok(Action::await_change());
    };

    let generation = current.metadata.generation.unwrap_or(0);
    let status = current.status.clone().unwrap_or_default();

    // Step 2: terminal short-circuit.
    if condition::is_terminal(&status.conditions) {
        delete_claim_if_present(&claims, &current.name_any()).await?;
        return Ok(Action::await_change());
    }

    // Step 3: initialise.
    if condition::get_condition(&status.conditions, condition::SUCCEEDED).is_none() {
        patch_succeeded(
            &tasks,
            &current.name_any(),
            ConditionStatus::Unknown,
            reason::PENDING,
            "Waiting for job to start",
            generation,
        )
        .await?;
        return Ok(Action::requeue(StdDuration::from_secs(1)));
    }

    // Step 4: claim existence.
    let claim = claims.get_opt(&current.name_any()).await?;
    let Some(claim) = claim else {
        let claim = build_sandbox_claim(&current);
        claims.create(&PostParams::default(), &claim).await?;
        let patch = json!({
            "status": {
                "sandboxClaimName": current.name_any(),
                "startTime": Utc::now().to_rfc3339(),
            }
        });
        tasks
            .patch_status(&current.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        return Ok(Action::await_change());
    };

    let is_running = condition::get_condition(&status.conditions, condition::SUCCEEDED)
        .map(|c| c.reason == reason::RUNNING)
        .unwrap_or(false);

    // Step 6: timeout, checked ahead of claim readiness since it applies
    // regardless of the claim's observed state once the task is running.
    if is_running {
        if let Some(start) = status.start_time {
            let timeout = resolve_timeout(&current);
            if Utc::now() - start > chrono::Duration::from_std(timeout).unwrap_or_default() {
                patch_succeeded(
                    &tasks,
                    &current.name_any(),
                    ConditionStatus::False,
                    reason::TIMED_OUT,
                    "Runner exceeded its configured timeout",
                    generation,
                )
                .await?;
                delete_claim_if_present(&claims, &current.name_any()).await?;
                return Ok(Action::await_change());
            }
        }
    }

    // Step 5: claim readiness.
    let claim_status = claim.status.clone().unwrap_or_default();
    let ready = condition::get_condition(&claim_status.conditions, READY);

    match ready.map(|c| c.status) {
        None | Some(ConditionStatus::Unknown) => Ok(Action::await_change()),
        Some(ConditionStatus::True) => {
            if is_running {
                return Ok(Action::await_change());
            }
            assign(&tasks, &claims, &ctx, &current, &claim).await
        }
        Some(ConditionStatus::False) => {
            if !is_running {
                return Ok(Action::await_change());
            }
            handle_sandbox_terminated(&tasks, &claims, &current, ready).await
        }
    }
}

async fn assign(
    tasks: &Api<TaskRecord>,
    claims: &Api<SandboxClaim>,
    ctx: &Context,
    task: &TaskRecord,
    claim: &SandboxClaim,
) -> Result<Action, ReconcileError> {
    let claim_status = claim.status.clone().unwrap_or_default();
    let Some(sandbox_ref) = claim_status.sandbox_status else {
        return Ok(Action::requeue(StdDuration::from_secs(5)));
    };

    let sandboxes: Api<shepherd_types::Sandbox> = Api::namespaced(ctx.client.clone(), &task.namespace().unwrap_or_default());
    let Some(sandbox) = sandboxes.get_opt(&sandbox_ref.name).await? else {
        return Ok(Action::requeue(StdDuration::from_secs(5)));
    };
    let Some(service_fqdn) = sandbox.status.and_then(|s| s.service_fqdn) else {
        return Ok(Action::requeue(StdDuration::from_secs(5)));
    };

    let token = mint_and_store_token(&ctx.client, task).await?;
    let outcome = assign_runner(&ctx.http, &service_fqdn, &token, &task.name_any(), &ctx.config.internal_api_url).await;
    let generation = task.metadata.generation.unwrap_or(0);

    match outcome {
        AssignOutcome::Assigned => {
            set_assignment_failures(tasks, &task.name_any(), 0).await?;
            patch_succeeded(tasks, &task.name_any(), ConditionStatus::Unknown, reason::RUNNING, "Runner assigned", generation)
                .await?;
            Ok(Action::await_change())
        }
        AssignOutcome::Retry => {
            let failures = task.status.as_ref().map(|s| s.assignment_failures).unwrap_or(0) + 1;
            if assignment_failures_exhausted(failures, ctx.config.max_assignment_failures) {
                patch_succeeded(
                    tasks,
                    &task.name_any(),
                    ConditionStatus::False,
                    reason::FAILED,
                    "Runner assignment failed after repeated retries",
                    generation,
                )
                .await?;
                delete_claim_if_present(claims, &task.name_any()).await?;
                Ok(Action::await_change())
            } else {
                set_assignment_failures(tasks, &task.name_any(), failures).await?;
                Ok(Action::requeue(StdDuration::from_secs(10)))
            }
        }
    }
}

async fn set_assignment_failures(tasks: &Api<TaskRecord>, name: &str, failures: u32) -> Result<(), ReconcileError> {
    let patch = json!({ "status": { "assignmentFailures": failures } });
    tasks.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

fn assignment_failures_exhausted(failures: u32, max_assignment_failures: u32) -> bool {
    failures > max_assignment_failures
}

async fn handle_sandbox_terminated(
    tasks: &Api<TaskRecord>,
    claims: &Api<SandboxClaim>,
    task: &TaskRecord,
    ready: Option<&Condition>,
) -> Result<Action, ReconcileError> {
    // The runner may have already reported terminal success via the status
    // endpoint by the time we observe Ready=False; refetch before declaring
    // a sandbox-side failure.
    let Some(refetched) = tasks.get_opt(&task.name_any()).await? else {
        return Ok(Action::await_change());
    };
    let status = refetched.status.clone().unwrap_or_default();
    if condition::is_terminal(&status.conditions) {
        delete_claim_if_present(claims, &task.name_any()).await?;
        return Ok(Action::await_change());
    }

    let Some(observed_at) = status.sandbox_terminated_observed_at else {
        set_sandbox_terminated_observed_at(tasks, &task.name_any(), Utc::now()).await?;
        return Ok(Action::requeue(StdDuration::from_secs(30)));
    };
    if !grace_period_elapsed(observed_at, Utc::now()) {
        return Ok(Action::requeue(StdDuration::from_secs(30)));
    }

    let generation = refetched.metadata.generation.unwrap_or(0);
    let failure_reason = classify_failure_reason(ready.map(|c| c.reason.as_str()));
    let message = ready.map(|c| c.message.clone()).unwrap_or_default();
    patch_succeeded(tasks, &task.name_any(), ConditionStatus::False, failure_reason, &message, generation).await?;
    delete_claim_if_present(claims, &task.name_any()).await?;
    Ok(Action::await_change())
}

async fn set_sandbox_terminated_observed_at(
    tasks: &Api<TaskRecord>,
    name: &str,
    at: chrono::DateTime<Utc>,
) -> Result<(), ReconcileError> {
    let patch = json!({ "status": { "sandboxTerminatedObservedAt": at.to_rfc3339() } });
    tasks.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch)).await?;
    Ok(())
}

fn grace_period_elapsed(observed_at: chrono::DateTime<Utc>, now: chrono::DateTime<Utc>) -> bool {
    now - observed_at >= chrono::Duration::seconds(30)
}

async fn delete_claim_if_present(claims: &Api<SandboxClaim>, name: &str) -> Result<(), ReconcileError> {
    match claims
        .delete(
            name,
            &DeleteParams {
                propagation_policy: Some(PropagationPolicy::Background),
                ..Default::default()
            },
        )
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn patch_succeeded(
    tasks: &Api<TaskRecord>,
    name: &str,
    status_value: ConditionStatus,
    reason: &str,
    message: &str,
    generation: i64,
) -> Result<(), ReconcileError> {
    let existing = tasks.get_opt(name).await?;
    let mut conditions = existing.and_then(|t| t.status).map(|s| s.conditions).unwrap_or_default();
    condition::set_condition(
        &mut conditions,
        Condition::new(condition::SUCCEEDED, status_value, reason, message, generation),
    );
    let patch = json!({ "status": { "conditions": conditions, "observedGeneration": generation } });
    tasks
        .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_failures_exhausted_trips_past_the_configured_max() {
        assert!(!assignment_failures_exhausted(1, 5));
        assert!(!assignment_failures_exhausted(5, 5));
        assert!(assignment_failures_exhausted(6, 5));
    }

    #[test]
    fn grace_period_elapsed_requires_a_full_30_seconds() {
        let observed_at = Utc::now();
        assert!(!grace_period_elapsed(observed_at, observed_at + chrono::Duration::seconds(29)));
        assert!(grace_period_elapsed(observed_at, observed_at + chrono::Duration::seconds(30)));
        assert!(grace_period_elapsed(observed_at, observed_at + chrono::Duration::seconds(45)));
    }
}
