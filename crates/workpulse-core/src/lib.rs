// Core pipeline abstractions
// Decision: keep this crate DB- and HTTP-agnostic; the envelope, tiers,
// provider values and the metrics engine are pure types shared by every stage

pub mod config;
pub mod envelope;
pub mod error;
pub mod field_mapping;
pub mod metrics;
pub mod provider_value;
pub mod status_doc;
pub mod tier;

pub use config::WorkerConfig;
pub use envelope::{
    queue_name, BatchFlags, ExtractionType, JobEnvelope, MessageBody, PipelineStep,
};
pub use error::{PipelineError, Result};
pub use field_mapping::{FieldProjection, TargetColumn};
pub use metrics::{StatusCategory, TransitionRecord, WorkflowMetrics};
pub use provider_value::ProviderValue;
pub use status_doc::{JobStatusDoc, StageState, StatusUpdate, StepStatus};
pub use tier::Tier;
