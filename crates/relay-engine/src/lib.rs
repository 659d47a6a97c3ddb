//! C7 — the twelve externally addressable tool operations, composing
//! C1–C6 behind one explicit [`Engine`] value.

pub mod dto;
pub mod engine;
mod ops_batch;
mod ops_issue;
mod ops_pr;
mod ops_selection;
mod ops_workflow;

pub use engine::Engine;
pub use relay_core::error::{ErrorCode, RelayError, Result};

pub use ops_batch::{batch_continue, implement_batch};
pub use ops_issue::{bulk_update_issues, create_issue, list_backlog, sync_backlog_labels};
pub use ops_pr::get_pr_status;
pub use ops_selection::{force_claim, get_workflow_status, release_lock, select_next_issue};
pub use ops_workflow::advance_workflow;
