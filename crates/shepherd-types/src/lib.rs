pub mod codec;
pub mod condition;
pub mod duration;
pub mod error;
pub mod event;
pub mod naming;
pub mod sandbox;
pub mod task_record;

pub use condition::{Condition, ConditionStatus};
pub use error::ModelError;
pub use event::{TaskEvent, TaskEventOutput, TaskEventType};
pub use sandbox::{Sandbox, SandboxClaim, SandboxClaimSpec, SandboxClaimStatus, SandboxSpec, SandboxStatus};
pub use task_record::{
    CallbackRef, RepoRef, RunnerConfig, SourceType, TaskDescription, TaskRecord, TaskRecordSpec,
    TaskRecordStatus, TaskResult,
};
