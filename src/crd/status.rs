//! # DopplerSecret Status
//!
//! Status types for tracking reconciliation state and conditions.

use serde::{Deserialize, Serialize};

/// Status of the DopplerSecret resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DopplerSecretStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Time the status last changed
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    /// "True" or "False"
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl DopplerSecretStatus {
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Insert or replace the condition of the same type.
    ///
    /// `lastTransitionTime` is carried over when the status value did not flip.
    pub fn set_condition(&mut self, mut condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            Some(existing) => {
                if existing.status == condition.status {
                    condition
                        .last_transition_time
                        .clone_from(&existing.last_transition_time);
                }
                *existing = condition;
            }
            None => self.conditions.push(condition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn condition(status: &str, time: &str, reason: &str) -> Condition {
        Condition {
            r#type: "secrets.doppler.com/SecretSyncReady".to_string(),
            status: status.to_string(),
            last_transition_time: Some(time.to_string()),
            reason: Some(reason.to_string()),
            message: None,
        }
    }

    #[test]
    fn test_set_condition_keeps_transition_time_when_status_unchanged() {
        let mut status = DopplerSecretStatus::default();
        status.set_condition(condition("True", "t1", "OK"));
        status.set_condition(condition("True", "t2", "OK"));

        assert_eq!(status.conditions.len(), 1);
        assert_eq!(
            status.conditions[0].last_transition_time.as_deref(),
            Some("t1")
        );
    }

    #[test]
    fn test_set_condition_moves_transition_time_on_flip() {
        let mut status = DopplerSecretStatus::default();
        status.set_condition(condition("True", "t1", "OK"));
        status.set_condition(condition("False", "t2", "Error"));

        let current = status
            .condition("secrets.doppler.com/SecretSyncReady")
            .unwrap();
        assert_eq!(current.status, "False");
        assert_eq!(current.reason.as_deref(), Some("Error"));
        assert_eq!(current.last_transition_time.as_deref(), Some("t2"));
    }
}
