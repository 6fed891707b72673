use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shepherd_types::condition::{self, SUCCEEDED};
use shepherd_types::TaskRecord;

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub repo: RepoInput,
    pub task: TaskInput,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    pub runner: RunnerInput,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct RepoInput {
    pub url: String,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskInput {
    pub description: String,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default, rename = "sourceURL")]
    pub source_url: Option<String>,
    #[serde(default, rename = "sourceType")]
    pub source_type: Option<String>,
    #[serde(default, rename = "sourceID")]
    pub source_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RunnerInput {
    #[serde(rename = "sandboxTemplateName")]
    pub sandbox_template_name: String,
    #[serde(default)]
    pub timeout: Option<String>,
    #[serde(default, rename = "serviceAccountName")]
    pub service_account_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: String,
    pub namespace: String,
    pub repo: RepoOutput,
    pub task: TaskOutput,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    pub status: TaskStatusOutput,
    #[serde(rename = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "completionTime", skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct RepoOutput {
    pub url: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskOutput {
    pub description: String,
    #[serde(rename = "sourceURL", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusOutput {
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "sandboxClaimName", skip_serializing_if = "Option::is_none")]
    pub sandbox_claim_name: Option<String>,
    #[serde(rename = "prURL", skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Projects a full TaskRecord into the summary response shape a client sees
/// (no context in the response, status derived from conditions).
pub fn to_task_response(task: &TaskRecord) -> TaskResponse {
    let status = task.status.clone().unwrap_or_default();
    let succeeded = condition::get_condition(&status.conditions, SUCCEEDED);
    TaskResponse {
        id: task.metadata.name.clone().unwrap_or_default(),
        namespace: task.metadata.namespace.clone().unwrap_or_default(),
        repo: RepoOutput {
            url: task.spec.repo.url.clone(),
            git_ref: task.spec.repo.git_ref.clone(),
        },
        task: TaskOutput {
            description: task.spec.task.description.clone(),
            source_url: task.spec.task.source_url.clone(),
        },
        callback_url: task.spec.callback.url.clone(),
        status: TaskStatusOutput {
            phase: condition::phase(&status.conditions).to_string(),
            message: succeeded.map(|c| c.message.clone()),
            sandbox_claim_name: status.sandbox_claim_name.clone(),
            pr_url: status.result.as_ref().and_then(|r| r.pr_url.clone()),
            error: status.result.as_ref().and_then(|r| r.error.clone()),
        },
        created_at: task.metadata.creation_timestamp.as_ref().map(|t| t.0),
        completion_time: status.completion_time,
    }
}

/// True when the record's `Succeeded` condition has `Status != Unknown` (or
/// is absent, i.e. still pending).
pub fn is_active(task: &TaskRecord) -> bool {
    task.status
        .as_ref()
        .map(|status| !condition::is_terminal(&status.conditions))
        .unwrap_or(true)
}

#[derive(Debug, Deserialize)]
pub struct StatusIngestRequest {
    pub event: StatusEventKind,
    pub message: String,
    #[serde(default)]
    pub details: Option<StatusDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusEventKind {
    Started,
    Progress,
    Completed,
    Failed,
}

#[derive(Debug, Deserialize)]
pub struct StatusDetails {
    #[serde(default, rename = "pr_url")]
    pub pr_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusIngestResponse {
    pub noop: bool,
}

#[derive(Debug, Deserialize)]
pub struct EventIngestRequest {
    pub events: Vec<shepherd_types::TaskEvent>,
}

#[derive(Debug, Serialize)]
pub struct TaskDataResponse {
    pub description: String,
    pub context: String,
    #[serde(rename = "sourceURL", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    pub repo: RepoOutput,
}

#[derive(Debug, Serialize)]
pub struct CredentialResponse {
    pub token: String,
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
}
