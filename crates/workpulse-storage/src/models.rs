// Database models (internal rows and write inputs)

use chrono::{DateTime, Utc};
use sqlx::FromRow;

// ============================================
// Tenancy
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: i64,
    pub name: String,
    pub tier: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct IntegrationRow {
    pub id: i64,
    pub tenant_id: i64,
    pub provider: String,
    /// Encrypted credentials envelope (see encryption module)
    pub credentials: serde_json::Value,
    pub base_url: String,
    pub base_search_filter: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

// ============================================
// Job scheduling
// ============================================

/// JobSchedule lifecycle states
pub mod job_status {
    pub const READY: &str = "READY";
    pub const RUNNING: &str = "RUNNING";
    pub const FINISHED: &str = "FINISHED";
    pub const PENDING: &str = "PENDING";
    pub const PAUSED: &str = "PAUSED";
    pub const FAILED: &str = "FAILED";
    pub const RATE_LIMIT_REACHED: &str = "RATE_LIMIT_REACHED";
}

#[derive(Debug, Clone, FromRow)]
pub struct JobScheduleRow {
    pub id: i64,
    pub tenant_id: i64,
    pub integration_id: i64,
    pub job_name: String,
    pub status: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_run_started_at: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub execution_order: i32,
    pub error_message: Option<String>,
    pub checkpoint: Option<serde_json::Value>,
    pub status_doc: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

// ============================================
// Raw extraction staging
// ============================================

/// RawExtractionData lifecycle states
pub mod raw_status {
    pub const PENDING: &str = "pending";
    pub const COMPLETED: &str = "completed";
    pub const FAILED: &str = "failed";
}

#[derive(Debug, Clone, FromRow)]
pub struct RawExtractionDataRow {
    pub id: i64,
    pub tenant_id: i64,
    pub integration_id: i64,
    #[sqlx(rename = "type")]
    pub extraction_type: String,
    pub raw_data: serde_json::Value,
    pub status: String,
    pub error_details: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateRawExtraction {
    pub tenant_id: i64,
    pub integration_id: i64,
    pub extraction_type: String,
    pub raw_data: serde_json::Value,
}

// ============================================
// Reference entities
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub tenant_id: i64,
    pub integration_id: i64,
    pub external_id: String,
    pub key: String,
    pub name: Option<String>,
    pub project_type: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct WitRow {
    pub id: i64,
    pub tenant_id: i64,
    pub integration_id: i64,
    pub external_id: String,
    pub original_name: String,
    pub description: Option<String>,
    pub hierarchy_level: Option<i32>,
    pub mapping_id: Option<i64>,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct StatusRow {
    pub id: i64,
    pub tenant_id: i64,
    pub integration_id: i64,
    pub external_id: String,
    pub original_name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub mapping_id: Option<i64>,
    pub active: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct CustomFieldRow {
    pub id: i64,
    pub tenant_id: i64,
    pub integration_id: i64,
    pub external_id: String,
    pub name: String,
    pub field_type: Option<String>,
    pub operations: Option<String>,
    pub active: bool,
}

// ============================================
// Work items and satellites
// ============================================

#[derive(Debug, Clone, FromRow)]
pub struct WorkItemIdRow {
    pub id: i64,
    pub external_id: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct WorkItemCreatedRow {
    pub id: i64,
    pub external_id: String,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChangelogRow {
    pub id: i64,
    pub work_item_id: i64,
    pub external_id: String,
    pub from_status_id: Option<i64>,
    pub to_status_id: Option<i64>,
    pub transition_start_date: Option<DateTime<Utc>>,
    pub transition_change_date: Option<DateTime<Utc>>,
    pub time_in_status_seconds: f64,
    pub changed_by: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SprintRow {
    pub id: i64,
    pub tenant_id: i64,
    pub integration_id: i64,
    pub external_id: String,
    pub board_id: Option<i64>,
    pub name: Option<String>,
    pub state: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct UpsertSprint {
    pub tenant_id: i64,
    pub integration_id: i64,
    pub external_id: String,
    pub board_id: Option<i64>,
    pub name: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PrLinkKeyRow {
    pub work_item_id: i64,
    pub external_repo_id: String,
    pub pull_request_number: i32,
}

// ============================================
// Dead letters
// ============================================

#[derive(Debug, Clone)]
pub struct CreateExtractionFailure {
    pub tenant_id: i64,
    pub integration_id: i64,
    pub extraction_type: String,
    pub original_message: serde_json::Value,
    pub error_message: String,
}

// ============================================
// Queue substrate
// ============================================

/// A message leased to one consumer; ack deletes it, an expired lease
/// returns it to the queue.
#[derive(Debug, Clone, FromRow)]
pub struct LeasedMessage {
    pub id: i64,
    pub payload: serde_json::Value,
    pub retry_count: i32,
}
