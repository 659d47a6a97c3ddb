//! `implement_batch`, `batch_continue`.

use relay_audit::{AuditRecord, Outcome};
use relay_core::error::{ErrorCode, RelayError, Result};
use relay_core::issue::{IssueType, Priority};
use relay_core::priority::{apply_filters, calculate_score, order_candidates, FilterOptions, ScoredIssue, ScoringContext};
use relay_github::types::PrState;
use relay_github::{issues, pull_requests, sub_issues, with_retry};

use crate::dto::*;
use crate::engine::{github_err, Engine};

pub async fn implement_batch(engine: &Engine, req: ImplementBatchRequest) -> Result<ImplementBatchResponse> {
    if req.count == 0 || req.count > 10 {
        return Err(RelayError::internal("count must be between 1 and 10"));
    }

    let open = with_retry(engine.retry_policy, || issues::list_open_issues(&engine.github))
        .await
        .map_err(github_err)?;

    let include_types = req.include_types.as_deref().map(|v| v.iter().filter_map(|s| IssueType::parse_label(s)).collect());
    let exclude_types = req.exclude_types.as_deref().map(|v| v.iter().filter_map(|s| IssueType::parse_label(s)).collect());
    let mut filtered = apply_filters(open, &FilterOptions { include_types, exclude_types });

    if let Some(ceiling) = req.max_priority.as_deref().and_then(Priority::parse_label) {
        filtered.retain(|i| i.priority().map(|p| p.at_least(ceiling)).unwrap_or(false));
    }

    let now = chrono::Utc::now();
    let mut scored = Vec::with_capacity(filtered.len());
    for issue in filtered {
        let has_open_parent = sub_issues::has_open_parent(&engine.github, issue.number).await;
        let score = calculate_score(&issue, ScoringContext { has_open_parent }, now);
        scored.push(ScoredIssue { issue, score });
    }
    let ordered = order_candidates(scored);

    let selected: Vec<u64> = ordered.iter().take(req.count as usize).map(|s| s.issue.number).collect();
    if selected.is_empty() {
        return Ok(ImplementBatchResponse { action: BatchAction::Empty, batch_id: None, issue: None, instructions: None });
    }

    let batch = engine
        .batches
        .create(engine.owner(), engine.repo(), selected)
        .map_err(|e| RelayError::internal(e.to_string()))?;
    let batch = engine
        .batches
        .start_next(&batch.id)
        .map_err(|e| RelayError::internal(e.to_string()))?;
    let first_number = batch.current_issue.expect("start_next just populated current_issue");

    let issue = with_retry(engine.retry_policy, || issues::get_issue(&engine.github, first_number))
        .await
        .map_err(github_err)?;

    let record = AuditRecord::new(&engine.session_id, "implement_batch", engine.owner(), engine.repo(), Outcome::Success)
        .with_details(serde_json::json!({ "batch_id": batch.id }));
    let _ = engine.audit.append(&record);

    Ok(ImplementBatchResponse {
        action: BatchAction::Implement,
        batch_id: Some(batch.id),
        issue: Some(issue),
        instructions: Some("Implement this issue, open a pull request, then call batch_continue with the PR number.".to_string()),
    })
}

pub async fn batch_continue(engine: &Engine, req: BatchContinueRequest) -> Result<BatchContinueResponse> {
    let mut batch = engine
        .batches
        .get(&req.batch_id)
        .map_err(|e| RelayError::internal(e.to_string()))?
        .ok_or_else(|| RelayError::internal("no batch exists with this id"))?;

    if batch.status == relay_store::BatchStatus::Timeout {
        batch = engine
            .batches
            .resume(&req.batch_id)
            .map_err(|e| RelayError::internal(e.to_string()))?;
    }

    if let Some(pr_number) = req.pr_number {
        batch = engine
            .batches
            .set_pr(&req.batch_id, pr_number)
            .map_err(|e| RelayError::internal(e.to_string()))?;
    }

    let poll_interval = std::time::Duration::from_secs(engine.config.batch.poll_interval_secs);

    loop {
        let Some(pr_number) = batch.current_pr else {
            return Err(RelayError::internal("batch has no PR number recorded; call batch_continue with prNumber first"));
        };

        let pr = with_retry(engine.retry_policy, || pull_requests::get_pull_request(&engine.github, pr_number))
            .await;

        match pr {
            Ok(pr) if pr.state == PrState::Merged => {
                batch = engine
                    .batches
                    .complete_current(&req.batch_id)
                    .map_err(|e| RelayError::internal(e.to_string()))?;

                let record = AuditRecord::new(&engine.session_id, "batch_continue", engine.owner(), engine.repo(), Outcome::Success)
                    .with_details(serde_json::json!({ "batch_id": batch.id, "merged_pr": pr_number }));
                let _ = engine.audit.append(&record);

                if batch.status == relay_store::BatchStatus::Completed {
                    return Ok(BatchContinueResponse {
                        action: BatchAction::Complete,
                        issue: None,
                        progress: None,
                        completed: Some(batch.completed),
                    });
                }

                batch = engine
                    .batches
                    .start_next(&req.batch_id)
                    .map_err(|e| RelayError::internal(e.to_string()))?;
                let next_number = batch.current_issue.expect("start_next just populated current_issue");
                let issue = with_retry(engine.retry_policy, || issues::get_issue(&engine.github, next_number))
                    .await
                    .map_err(github_err)?;

                return Ok(BatchContinueResponse {
                    action: BatchAction::Implement,
                    issue: Some(issue),
                    progress: Some(BatchProgress {
                        current: batch.completed_count + 1,
                        total: batch.total_count,
                    }),
                    completed: None,
                });
            }
            Ok(_not_merged) => {}
            Err(e) => {
                tracing::warn!(error = %e, "batch_continue: transient error polling PR status, continuing");
            }
        }

        if engine.batches.is_past_deadline(&batch) {
            batch = engine
                .batches
                .timeout_current(&req.batch_id)
                .map_err(|e| RelayError::internal(e.to_string()))?;

            let record = AuditRecord::new(&engine.session_id, "batch_continue", engine.owner(), engine.repo(), Outcome::Failure)
                .with_error("poll deadline exceeded before the PR merged")
                .with_details(serde_json::json!({ "batch_id": batch.id, "timeout": true }));
            let _ = engine.audit.append(&record);

            return Ok(BatchContinueResponse {
                action: BatchAction::Timeout,
                issue: None,
                progress: Some(BatchProgress { current: batch.completed_count, total: batch.total_count }),
                completed: None,
            });
        }

        tokio::time::sleep(poll_interval).await;
    }
}
