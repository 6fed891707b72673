use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state condition status, mirroring the Kubernetes condition convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConditionStatus::True | ConditionStatus::False)
    }
}

/// A single `{type, status, reason, message}` entry attached to a record's status,
/// keyed by `condition_type`. Persisted as an ordered list but treated everywhere
/// in this crate as a map keyed by type with last-writer-wins semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: String,
    pub message: String,
    pub observed_generation: i64,
    #[schemars(with = "String")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            condition_type: condition_type.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Finds the condition of the given type, if any.
pub fn get_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}

/// Inserts or replaces the condition of `new.condition_type`, preserving the
/// position of the existing entry (or appending) so serialised output stays
/// diff-friendly. Last writer per type wins.
pub fn set_condition(conditions: &mut Vec<Condition>, new: Condition) {
    if let Some(existing) = conditions.iter_mut().find(|c| c.condition_type == new.condition_type) {
        *existing = new;
    } else {
        conditions.push(new);
    }
}

pub const SUCCEEDED: &str = "Succeeded";
pub const NOTIFIED: &str = "Notified";

pub mod reason {
    pub const PENDING: &str = "Pending";
    pub const RUNNING: &str = "Running";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";
    pub const TIMED_OUT: &str = "TimedOut";
    pub const CANCELLED: &str = "Cancelled";
    pub const CALLBACK_SENT: &str = "CallbackSent";
    pub const CALLBACK_FAILED: &str = "CallbackFailed";
}

/// `Succeeded.Status != Unknown`, i.e. the task has reached a terminal outcome.
pub fn is_terminal(conditions: &[Condition]) -> bool {
    get_condition(conditions, SUCCEEDED)
        .map(|c| c.status.is_terminal())
        .unwrap_or(false)
}

/// The user-facing phase name, derived from the `Succeeded` condition's reason,
/// or `"Pending"` if the condition is absent yet.
pub fn phase(conditions: &[Condition]) -> &str {
    get_condition(conditions, SUCCEEDED)
        .map(|c| c.reason.as_str())
        .unwrap_or(reason::PENDING)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_condition_preserves_position_on_update() {
        let mut conditions = vec![
            Condition::new(SUCCEEDED, ConditionStatus::Unknown, reason::PENDING, "waiting", 1),
            Condition::new(NOTIFIED, ConditionStatus::True, reason::CALLBACK_SENT, "sent", 1),
        ];
        set_condition(
            &mut conditions,
            Condition::new(SUCCEEDED, ConditionStatus::Unknown, reason::RUNNING, "assigned", 1),
        );
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].condition_type, SUCCEEDED);
        assert_eq!(conditions[0].reason, reason::RUNNING);
        assert_eq!(conditions[1].condition_type, NOTIFIED);
    }

    #[test]
    fn terminal_detection() {
        let conditions = vec![Condition::new(
            SUCCEEDED,
            ConditionStatus::False,
            reason::FAILED,
            "boom",
            1,
        )];
        assert!(is_terminal(&conditions));
        assert_eq!(phase(&conditions), reason::FAILED);
    }

    #[test]
    fn absent_condition_is_not_terminal_and_phase_is_pending() {
        assert!(!is_terminal(&[]));
        assert_eq!(phase(&[]), reason::PENDING);
    }
}
