use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;

/// The durable task identity: accepted by Ingress, driven forward by the
/// Controller, observed for terminal transitions by the Watcher.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "shepherd.io",
    version = "v1alpha1",
    kind = "TaskRecord",
    plural = "taskrecords",
    shortname = "task",
    status = "TaskRecordStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecordSpec {
    pub repo: RepoRef,
    pub task: TaskDescription,
    pub callback: CallbackRef,
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RepoRef {
    pub url: String,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescription {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Issue,
    Pr,
    Fleet,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Issue => "issue",
            SourceType::Pr => "pr",
            SourceType::Fleet => "fleet",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issue" => Ok(SourceType::Issue),
            "pr" => Ok(SourceType::Pr),
            "fleet" => Ok(SourceType::Fleet),
            other => Err(format!("unknown source type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallbackRef {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    pub sandbox_template_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecordStatus {
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_claim_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Set once `GET /tasks/{id}/token` has issued a credential for this
    /// task; a second call is rejected with 409 (one-shot credential contract).
    #[serde(default)]
    pub credential_issued: bool,
    /// Consecutive runner-assignment failures since the sandbox last became
    /// ready. Reset whenever assignment succeeds; past `max_assignment_failures`
    /// the controller gives up and marks the task Failed.
    #[serde(default)]
    pub assignment_failures: u32,
    /// Set the first time the controller observes `Ready=False` while the
    /// task is running, so a second observation after the grace period can be
    /// told apart from the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub sandbox_terminated_observed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub mod labels {
    pub const REPO: &str = "task-repo";
    pub const ISSUE: &str = "task-issue";
    pub const FLEET: &str = "task-fleet";
    pub const SOURCE_TYPE: &str = "task-source-type";
    pub const SOURCE_ID: &str = "task-source-id";
    pub const TASK: &str = "task";
    pub const TYPE: &str = "type";
    pub const TASK_TOKEN: &str = "task-token";
}
