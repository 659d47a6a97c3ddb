//! `advance_workflow`.

use relay_audit::{AuditRecord, Outcome};
use relay_core::error::{ErrorCode, RelayError, Result};
use relay_github::{branches, pull_requests, with_retry};
use relay_store::{AdvanceRequest, LockKey, Phase, WorkflowError};

use crate::dto::*;
use crate::engine::{github_err, Engine};

fn map_workflow_error(e: WorkflowError) -> RelayError {
    match e {
        WorkflowError::NotFound => RelayError::new(ErrorCode::WorkflowNotFound, "no workflow state for this issue"),
        WorkflowError::InvalidTransition => RelayError::new(ErrorCode::InvalidPhaseTransition, "phase pair not permitted"),
        WorkflowError::SkipJustificationRequired => {
            RelayError::new(ErrorCode::SkipJustificationRequired, "forward skip requires a justification")
        }
        WorkflowError::TestsRequired => {
            RelayError::new(ErrorCode::TestsRequired, "commit/pr transition requires testsPassed or a justification")
        }
        other => RelayError::internal(other.to_string()),
    }
}

pub async fn advance_workflow(engine: &Engine, req: AdvanceWorkflowRequest) -> Result<AdvanceWorkflowResponse> {
    let key = LockKey {
        owner: engine.owner().to_string(),
        repo: engine.repo().to_string(),
        issue_number: req.issue_number,
    };
    let lock = engine
        .locks
        .read(&key)
        .map_err(|e| RelayError::internal(e.to_string()))?
        .ok_or_else(|| RelayError::new(ErrorCode::NotLocked, "no lock held for this issue"))?;
    if lock.session_id != engine.session_id {
        return Err(RelayError::new(ErrorCode::NotLocked, "caller does not hold this lock"));
    }

    let before = engine
        .workflows
        .get(engine.owner(), engine.repo(), req.issue_number)
        .map_err(|e| RelayError::internal(e.to_string()))?
        .ok_or_else(|| RelayError::new(ErrorCode::WorkflowNotFound, "no workflow state for this issue"))?;
    let previous_phase = before.current_phase;

    let advance_req = AdvanceRequest {
        target_phase: req.target_phase,
        tests_passed: req.tests_passed,
        skip_justification: req.skip_justification.clone(),
        trigger: req.trigger.clone().unwrap_or_else(|| "advance_workflow".to_string()),
        session_id: engine.session_id.clone(),
    };

    let state = engine
        .workflows
        .advance(engine.owner(), engine.repo(), req.issue_number, advance_req)
        .map_err(map_workflow_error)?;

    let mut branch_name = state.branch_name.clone();
    let mut pr_number = state.pr_number;
    let mut pr_url = None;

    if req.target_phase == Phase::Branch {
        let issue = relay_github::issues::get_issue(&engine.github, req.issue_number).await.map_err(github_err)?;
        let name = branches::branch_name(req.issue_number, &issue.title);
        with_retry(engine.retry_policy, || branches::create_branch_from_default_head(&engine.github, &name))
            .await
            .map_err(github_err)?;
        engine
            .workflows
            .set_branch_name(engine.owner(), engine.repo(), req.issue_number, name.clone())
            .map_err(|e| RelayError::internal(e.to_string()))?;
        branch_name = Some(name);
    } else if req.target_phase == Phase::Pr {
        let branch = branch_name.clone().ok_or_else(|| RelayError::internal("pr transition requires a stored branch name"))?;
        let title = req.pr_title.clone().ok_or_else(|| RelayError::internal("pr transition requires a title"))?;
        let body = req.pr_body.clone().unwrap_or_default();

        let base = with_retry(engine.retry_policy, || branches::get_default_branch(&engine.github))
            .await
            .map_err(github_err)?;
        let pr = with_retry(engine.retry_policy, || {
            pull_requests::create_pull_request(&engine.github, &title, &body, &branch, &base)
        })
        .await
        .map_err(github_err)?;

        engine
            .workflows
            .set_pr_number(engine.owner(), engine.repo(), req.issue_number, pr.number)
            .map_err(|e| RelayError::internal(e.to_string()))?;
        with_retry(engine.retry_policy, || {
            relay_github::labels::replace_label(&engine.github, req.issue_number, "status:in-progress", "status:in-review")
        })
        .await
        .map_err(github_err)?;

        pr_number = Some(pr.number);
        pr_url = Some(pr.html_url);
    }

    let record = AuditRecord::new(&engine.session_id, "advance_workflow", engine.owner(), engine.repo(), Outcome::Success)
        .with_issue(req.issue_number)
        .with_phase(format!("{:?}", state.current_phase).to_lowercase())
        .with_details(serde_json::json!({ "from": previous_phase, "to": state.current_phase }));
    let _ = engine.audit.append(&record);

    let transition_record =
        AuditRecord::phase_transition(&engine.session_id, "advance_workflow", engine.owner(), engine.repo(), Outcome::Success)
            .with_issue(req.issue_number)
            .with_phase(format!("{:?}", state.current_phase).to_lowercase())
            .with_details(serde_json::json!({ "from": previous_phase, "to": state.current_phase }));
    let _ = engine.audit.append(&transition_record);

    Ok(AdvanceWorkflowResponse {
        previous_phase,
        current_phase: state.current_phase,
        branch_name,
        pr_number,
        pr_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_every_known_workflow_error_to_its_own_code() {
        assert_eq!(map_workflow_error(WorkflowError::NotFound).code, ErrorCode::WorkflowNotFound);
        assert_eq!(map_workflow_error(WorkflowError::InvalidTransition).code, ErrorCode::InvalidPhaseTransition);
        assert_eq!(
            map_workflow_error(WorkflowError::SkipJustificationRequired).code,
            ErrorCode::SkipJustificationRequired
        );
        assert_eq!(map_workflow_error(WorkflowError::TestsRequired).code, ErrorCode::TestsRequired);
    }

    #[test]
    fn io_and_serde_variants_fall_back_to_internal_error() {
        let io_err = WorkflowError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert_eq!(map_workflow_error(io_err).code, ErrorCode::InternalError);
    }
}
