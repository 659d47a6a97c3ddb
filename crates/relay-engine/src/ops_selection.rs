//! `select_next_issue`, `release_lock`, `force_claim`, `get_workflow_status`.

use relay_audit::{AuditRecord, Level, Outcome};
use relay_core::error::{ErrorCode, RelayError, Result};
use relay_core::issue::{IssueState, IssueType};
use relay_core::priority::{apply_filters, calculate_score, order_candidates, FilterOptions, ScoredIssue, ScoringContext};
use relay_github::{issues, labels, sub_issues, with_retry};
use relay_store::{LockError, LockKey};

use crate::dto::*;
use crate::engine::{github_err, Engine};

const FORCE_CLAIM_CONFIRMATION: &str = "I understand this may cause conflicts";

fn lock_key(engine: &Engine, issue_number: u64) -> LockKey {
    LockKey {
        owner: engine.owner().to_string(),
        repo: engine.repo().to_string(),
        issue_number,
    }
}

pub async fn select_next_issue(engine: &Engine, req: SelectNextIssueRequest) -> Result<SelectNextIssueResponse> {
    let open = with_retry(engine.retry_policy, || issues::list_open_issues(&engine.github))
        .await
        .map_err(github_err)?;

    let include_types = req.include_types.as_deref().map(|v| v.iter().filter_map(|s| IssueType::parse_label(s)).collect());
    let exclude_types = req.exclude_types.as_deref().map(|v| v.iter().filter_map(|s| IssueType::parse_label(s)).collect());
    let filtered = apply_filters(open, &FilterOptions { include_types, exclude_types });

    if filtered.is_empty() {
        return Err(RelayError::new(ErrorCode::NoIssuesAvailable, "no candidates remain after filtering"));
    }

    let now = chrono::Utc::now();
    let mut scored = Vec::with_capacity(filtered.len());
    for issue in filtered {
        let has_open_parent = sub_issues::has_open_parent(&engine.github, issue.number).await;
        let score = calculate_score(&issue, ScoringContext { has_open_parent }, now);
        scored.push(ScoredIssue { issue, score });
    }
    let ordered = order_candidates(scored);

    for candidate in ordered {
        let key = lock_key(engine, candidate.issue.number);
        match engine.locks.acquire(&key, &engine.session_id, engine.pid) {
            Ok(lock) => {
                with_retry(engine.retry_policy, || {
                    labels::replace_label(&engine.github, candidate.issue.number, "status:backlog", "status:in-progress")
                })
                .await
                .map_err(github_err)?;

                engine
                    .workflows
                    .create(engine.owner(), engine.repo(), candidate.issue.number)
                    .map_err(|e| RelayError::internal(e.to_string()))?;

                let record = AuditRecord::new(&engine.session_id, "select_next_issue", engine.owner(), engine.repo(), Outcome::Success)
                    .with_issue(candidate.issue.number)
                    .with_phase("selection")
                    .with_details(serde_json::json!({ "score": candidate.score.total_score }));
                let _ = engine.audit.append(&record);

                let lock_record =
                    AuditRecord::lock_event(&engine.session_id, "lock_acquire", engine.owner(), engine.repo(), Outcome::Success)
                        .with_issue(candidate.issue.number);
                let _ = engine.audit.append(&lock_record);

                return Ok(SelectNextIssueResponse {
                    issue: candidate.issue,
                    score: candidate.score,
                    session_id: lock.session_id,
                    acquired_at: lock.acquired_at,
                });
            }
            Err(LockError::Held) => continue,
            Err(e) => return Err(RelayError::new(ErrorCode::LockCreationFailed, e.to_string())),
        }
    }

    Err(RelayError::new(ErrorCode::AllIssuesLocked, "every candidate lost the acquisition race"))
}

pub async fn release_lock(engine: &Engine, req: ReleaseLockRequest) -> Result<ReleaseLockResponse> {
    let key = lock_key(engine, req.issue_number);
    let lock = engine
        .locks
        .read(&key)
        .map_err(|e| RelayError::internal(e.to_string()))?
        .ok_or_else(|| RelayError::new(ErrorCode::NotLocked, "no lock held for this issue"))?;

    if lock.session_id != engine.session_id {
        return Err(RelayError::new(ErrorCode::NotLocked, "another session holds this lock"));
    }

    let duration = chrono::Utc::now() - lock.acquired_at;

    engine
        .locks
        .release(&key, &engine.session_id)
        .map_err(|e| RelayError::internal(e.to_string()))?;
    let _ = engine.workflows.delete(engine.owner(), engine.repo(), req.issue_number);

    match req.reason {
        ReleaseReason::Abandoned => {
            with_retry(engine.retry_policy, || {
                labels::replace_label(&engine.github, req.issue_number, "status:in-progress", "status:backlog")
            })
            .await
            .map_err(github_err)?;
        }
        ReleaseReason::Completed => {
            with_retry(engine.retry_policy, || labels::remove_label(&engine.github, req.issue_number, "status:in-progress"))
                .await
                .map_err(github_err)?;
        }
        ReleaseReason::Merged => {
            with_retry(engine.retry_policy, || labels::remove_label(&engine.github, req.issue_number, "status:in-review"))
                .await
                .map_err(github_err)?;
            with_retry(engine.retry_policy, || issues::set_issue_state(&engine.github, req.issue_number, IssueState::Closed))
                .await
                .map_err(github_err)?;
        }
    }

    let record = AuditRecord::new(&engine.session_id, "release_lock", engine.owner(), engine.repo(), Outcome::Success)
        .with_issue(req.issue_number)
        .with_duration(duration);
    let _ = engine.audit.append(&record);

    let lock_record = AuditRecord::lock_event(&engine.session_id, "lock_release", engine.owner(), engine.repo(), Outcome::Success)
        .with_issue(req.issue_number)
        .with_duration(duration)
        .with_details(serde_json::json!({ "reason": req.reason }));
    let _ = engine.audit.append(&lock_record);

    Ok(ReleaseLockResponse { lock_duration_secs: duration.num_seconds() })
}

pub async fn force_claim(engine: &Engine, req: ForceClaimRequest) -> Result<ForceClaimResponse> {
    if req.confirmation != FORCE_CLAIM_CONFIRMATION {
        return Err(RelayError::new(ErrorCode::InvalidConfirmation, "confirmation string did not match"));
    }

    let key = lock_key(engine, req.issue_number);
    let (_, previous) = engine
        .locks
        .force_claim(&key, &engine.session_id, engine.pid)
        .map_err(|e| RelayError::internal(e.to_string()))?;

    with_retry(engine.retry_policy, || {
        issues::add_comment(
            &engine.github,
            req.issue_number,
            &format!("Claim forcibly reassigned to session `{}`.", engine.session_id),
        )
    })
    .await
    .map_err(github_err)?;

    if engine
        .workflows
        .get(engine.owner(), engine.repo(), req.issue_number)
        .map_err(|e| RelayError::internal(e.to_string()))?
        .is_none()
    {
        engine
            .workflows
            .create(engine.owner(), engine.repo(), req.issue_number)
            .map_err(|e| RelayError::internal(e.to_string()))?;
    }

    let previous_session_id = previous.map(|l| l.session_id);
    tracing::warn!(issue = req.issue_number, previous_holder = ?previous_session_id, "force-claimed lock");

    let record = AuditRecord::new(&engine.session_id, "force_claim", engine.owner(), engine.repo(), Outcome::Success)
        .with_level(Level::Warn)
        .with_issue(req.issue_number)
        .with_details(serde_json::json!({ "previous_session_id": previous_session_id }));
    let _ = engine.audit.append(&record);

    let lock_record = AuditRecord::lock_event(&engine.session_id, "lock_force_claim", engine.owner(), engine.repo(), Outcome::Success)
        .with_level(Level::Warn)
        .with_issue(req.issue_number)
        .with_details(serde_json::json!({ "previous_session_id": previous_session_id }));
    let _ = engine.audit.append(&lock_record);

    Ok(ForceClaimResponse { previous_session_id })
}

pub async fn get_workflow_status(engine: &Engine, req: GetWorkflowStatusRequest) -> Result<GetWorkflowStatusResponse> {
    let entries = if let Some(number) = req.issue_number {
        let workflow = engine
            .workflows
            .get(engine.owner(), engine.repo(), number)
            .map_err(|e| RelayError::internal(e.to_string()))?
            .ok_or_else(|| RelayError::new(ErrorCode::WorkflowNotFound, "no workflow state for this issue"))?;
        vec![WorkflowStatusEntry { issue_number: number, workflow }]
    } else {
        let locks = engine.locks.list().map_err(|e| RelayError::internal(e.to_string()))?;
        let mut entries = Vec::new();
        for (lock, _stale) in locks {
            if lock.session_id != engine.session_id {
                continue;
            }
            if let Some(workflow) = engine
                .workflows
                .get(&lock.owner, &lock.repo, lock.issue_number)
                .map_err(|e| RelayError::internal(e.to_string()))?
            {
                entries.push(WorkflowStatusEntry { issue_number: lock.issue_number, workflow });
            }
        }
        entries
    };

    Ok(GetWorkflowStatusResponse { entries })
}
