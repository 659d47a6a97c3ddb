//! Request/response shapes for the twelve tool operations. Tagged variants everywhere a "kind" string would otherwise
//! discriminate.

use relay_core::issue::Issue;
use relay_core::priority::PriorityScore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateIssueRequest {
    pub title: String,
    pub context: Option<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    pub technical_notes: Option<String>,
    pub body: Option<String>,
    pub priority: Option<String>,
    pub issue_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListBacklogRequest {
    pub limit: Option<u32>,
    pub include_types: Option<Vec<String>>,
    pub exclude_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedIssue {
    #[serde(flatten)]
    pub issue: Issue,
    pub score: PriorityScore,
    pub is_locked: bool,
    pub locked_by: Option<String>,
    pub blocked_by: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListBacklogResponse {
    pub issues: Vec<AnnotatedIssue>,
    pub total_candidates: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectNextIssueRequest {
    pub include_types: Option<Vec<String>>,
    pub exclude_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectNextIssueResponse {
    pub issue: Issue,
    pub score: PriorityScore,
    pub session_id: String,
    pub acquired_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvanceWorkflowRequest {
    pub issue_number: u64,
    pub target_phase: relay_store::Phase,
    pub tests_passed: Option<bool>,
    pub skip_justification: Option<String>,
    pub pr_title: Option<String>,
    pub pr_body: Option<String>,
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvanceWorkflowResponse {
    pub previous_phase: relay_store::Phase,
    pub current_phase: relay_store::Phase,
    pub branch_name: Option<String>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseLockRequest {
    pub issue_number: u64,
    pub reason: ReleaseReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    Abandoned,
    Completed,
    Merged,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseLockResponse {
    pub lock_duration_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForceClaimRequest {
    pub issue_number: u64,
    pub confirmation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForceClaimResponse {
    pub previous_session_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GetWorkflowStatusRequest {
    pub issue_number: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatusEntry {
    pub issue_number: u64,
    pub workflow: relay_store::WorkflowState,
}

#[derive(Debug, Clone, Serialize)]
pub struct GetWorkflowStatusResponse {
    pub entries: Vec<WorkflowStatusEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncBacklogLabelsRequest {
    pub mode: SyncMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    Report,
    Update,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncBacklogLabelsResponse {
    pub missing_priority: Vec<u64>,
    pub missing_type: Vec<u64>,
    pub missing_status: Vec<u64>,
    pub updated: Vec<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GetPrStatusRequest {
    pub pr_number: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkUpdateIssuesRequest {
    pub issue_numbers: Vec<u64>,
    pub add_labels: Option<Vec<String>>,
    pub remove_labels: Option<Vec<String>>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkUpdateIssuesResponse {
    pub updated: Vec<u64>,
    pub failed: Vec<BulkUpdateFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkUpdateFailure {
    pub issue_number: u64,
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImplementBatchRequest {
    pub count: u32,
    pub max_priority: Option<String>,
    pub include_types: Option<Vec<String>>,
    pub exclude_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchAction {
    Implement,
    Empty,
    Complete,
    Timeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImplementBatchResponse {
    pub action: BatchAction,
    pub batch_id: Option<uuid::Uuid>,
    pub issue: Option<Issue>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchContinueRequest {
    pub batch_id: uuid::Uuid,
    pub pr_number: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchContinueResponse {
    pub action: BatchAction,
    pub issue: Option<Issue>,
    pub progress: Option<BatchProgress>,
    pub completed: Option<Vec<relay_store::CompletedItem>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchProgress {
    pub current: u64,
    pub total: u64,
}
