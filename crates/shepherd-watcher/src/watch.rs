use std::sync::Arc;
use std::time::Duration as StdDuration;

use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use shepherd_types::condition::{self, reason, ConditionStatus, NOTIFIED};
use shepherd_types::{Condition, TaskRecord};
use thiserror::Error;

use crate::callback::{send_signed_callback, CallbackDetails, CallbackPayload};
use crate::config::WatcherConfig;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

pub struct Context {
    pub client: Client,
    pub http: reqwest::Client,
    pub config: WatcherConfig,
}

pub fn error_policy(_task: Arc<TaskRecord>, err: &WatchError, _ctx: Arc<Context>) -> Action {
    tracing::warn!(error = %err, "watcher reconcile failed");
    Action::requeue(StdDuration::from_secs(15))
}

/// Re-derives on every observed update whether the object just became
/// terminal and `Notified` is absent/`False`, and if so signs + sends the
/// adapter callback, CAS-deduping against the ingress status handler via a
/// refetch-and-recheck of `Notified` immediately before the write.
pub async fn reconcile(task: Arc<TaskRecord>, ctx: Arc<Context>) -> Result<Action, WatchError> {
    let namespace = task.namespace().unwrap_or_default();
    let tasks: Api<TaskRecord> = Api::namespaced(ctx.client.clone(), &namespace);

    let Some(current) = tasks.get_opt(&task.name_any()).await? else {
        return Ok(Action::await_change());
    };
    let status = current.status.clone().unwrap_or_default();

    if !condition::is_terminal(&status.conditions) {
        return Ok(Action::await_change());
    }

    let already_notified = condition::get_condition(&status.conditions, NOTIFIED)
        .map(|c| c.status == ConditionStatus::True)
        .unwrap_or(false);
    if already_notified {
        return Ok(Action::await_change());
    }

    let succeeded = condition::get_condition(&status.conditions, condition::SUCCEEDED);
    let (event, message, details) = match succeeded {
        Some(c) if c.status == ConditionStatus::True => (
            "completed",
            c.message.clone(),
            CallbackDetails {
                pr_url: status.result.as_ref().and_then(|r| r.pr_url.clone()),
                error: None,
            },
        ),
        Some(c) => (
            "failed",
            c.message.clone(),
            CallbackDetails {
                pr_url: None,
                error: status.result.as_ref().and_then(|r| r.error.clone()),
            },
        ),
        None => return Ok(Action::await_change()),
    };

    let sent = send_signed_callback(
        &ctx.http,
        &current.spec.callback.url,
        &ctx.config.adapter_hmac_secret,
        &CallbackPayload {
            task_id: &current.name_any(),
            event,
            message: &message,
            details: Some(details),
        },
    )
    .await;
    let notified_reason = if sent { reason::CALLBACK_SENT } else { reason::CALLBACK_FAILED };

    // Refetch-and-recheck immediately before writing: if the ingress status
    // handler's fast path already won the race and set Notified=True, this
    // write becomes a no-op rather than a second callback record.
    let refetched = tasks.get_opt(&current.name_any()).await?;
    let still_unnotified = refetched
        .as_ref()
        .and_then(|t| t.status.as_ref())
        .map(|s| {
            condition::get_condition(&s.conditions, NOTIFIED)
                .map(|c| c.status != ConditionStatus::True)
                .unwrap_or(true)
        })
        .unwrap_or(false);
    if !still_unnotified {
        return Ok(Action::await_change());
    }

    let generation = current.metadata.generation.unwrap_or(0);
    let mut conditions = refetched.and_then(|t| t.status).map(|s| s.conditions).unwrap_or_default();
    condition::set_condition(
        &mut conditions,
        Condition::new(NOTIFIED, ConditionStatus::True, notified_reason, "watcher observed terminal transition", generation),
    );
    let patch = json!({ "status": { "conditions": conditions } });
    let _ = tasks.patch_status(&current.name_any(), &PatchParams::default(), &Patch::Merge(&patch)).await;

    Ok(Action::await_change())
}
