// Job status document shipped to the status-broadcast layer.
//
// The document is persisted on the job schedule row and shipped wholesale on
// every first_item/last_item crossing, so consumers that refresh see the same
// shape they would get from a push.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Pipeline stage state as shown to users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageState {
    Pending,
    Running,
    Finished,
    Failed,
}

/// Per-step stage states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepStatus {
    pub extraction: StageState,
    pub transform: StageState,
    pub embedding: StageState,
}

impl Default for StepStatus {
    fn default() -> Self {
        Self {
            extraction: StageState::Pending,
            transform: StageState::Pending,
            embedding: StageState::Pending,
        }
    }
}

/// Well-known step names
pub mod steps {
    pub const REFERENCE_DATA: &str = "reference_data";
    pub const ISSUES: &str = "issues";
    pub const DEV_STATUS: &str = "dev_status";
}

/// Full job status document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobStatusDoc {
    pub steps: BTreeMap<String, StepStatus>,
}

impl JobStatusDoc {
    /// Fresh document with the given steps all pending
    pub fn new(step_names: &[&str]) -> Self {
        Self {
            steps: step_names
                .iter()
                .map(|name| (name.to_string(), StepStatus::default()))
                .collect(),
        }
    }

    pub fn set_extraction(&mut self, step: &str, state: StageState) {
        self.steps.entry(step.to_string()).or_default().extraction = state;
    }

    pub fn set_transform(&mut self, step: &str, state: StageState) {
        self.steps.entry(step.to_string()).or_default().transform = state;
    }

    pub fn set_embedding(&mut self, step: &str, state: StageState) {
        self.steps.entry(step.to_string()).or_default().embedding = state;
    }

    /// Mark every stage of every step as failed
    pub fn fail_all(&mut self) {
        for status in self.steps.values_mut() {
            status.extraction = StageState::Failed;
            status.transform = StageState::Failed;
            status.embedding = StageState::Failed;
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}))
    }

    pub fn from_value(value: &serde_json::Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Outbound status event: the full document plus correlation ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub tenant_id: i64,
    pub job_id: i64,
    pub status_json: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_shape() {
        let mut doc = JobStatusDoc::new(&[steps::REFERENCE_DATA, steps::ISSUES]);
        doc.set_extraction(steps::ISSUES, StageState::Running);

        let value = doc.to_value();
        assert_eq!(value["steps"]["issues"]["extraction"], "running");
        assert_eq!(value["steps"]["issues"]["transform"], "pending");
        assert_eq!(value["steps"]["reference_data"]["extraction"], "pending");
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut doc = JobStatusDoc::new(&[steps::DEV_STATUS]);
        doc.set_transform(steps::DEV_STATUS, StageState::Finished);
        doc.set_embedding(steps::DEV_STATUS, StageState::Failed);

        let restored = JobStatusDoc::from_value(&doc.to_value());
        assert_eq!(restored, doc);
    }

    #[test]
    fn test_fail_all() {
        let mut doc = JobStatusDoc::new(&[steps::ISSUES]);
        doc.fail_all();
        let status = &doc.steps[steps::ISSUES];
        assert_eq!(status.extraction, StageState::Failed);
        assert_eq!(status.embedding, StageState::Failed);
    }
}
