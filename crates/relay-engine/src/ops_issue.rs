//! `create_issue`, `list_backlog`, `sync_backlog_labels`, `bulk_update_issues`.

use relay_core::error::{ErrorCode, RelayError, Result};
use relay_core::issue::{IssueState, IssueType, Priority};
use relay_core::priority::{apply_filters, calculate_score, FilterOptions, ScoringContext};
use relay_github::{issues, labels, sub_issues, with_retry};
use relay_audit::{AuditRecord, Outcome};

use crate::dto::*;
use crate::engine::{github_err, Engine};

/// Format the canonical issue body template, unless a raw
/// body was supplied (raw overrides).
fn format_body(req: &CreateIssueRequest) -> String {
    if let Some(raw) = &req.body {
        return raw.clone();
    }

    let mut body = format!("## Summary\n{}\n", req.title);

    if let Some(context) = &req.context {
        body.push_str(&format!("\n## Context\n{context}\n"));
    }

    if !req.acceptance_criteria.is_empty() {
        body.push_str("\n## Acceptance Criteria\n");
        for item in &req.acceptance_criteria {
            body.push_str(&format!("- [ ] {item}\n"));
        }
    }

    if let Some(notes) = &req.technical_notes {
        body.push_str(&format!("\n## Technical Notes\n{notes}\n"));
    }

    body
}

pub async fn create_issue(engine: &Engine, req: CreateIssueRequest) -> Result<relay_core::issue::Issue> {
    let has_access = with_retry(engine.retry_policy, || issues::verify_write_access(&engine.github))
        .await
        .map_err(github_err)?;
    if !has_access {
        return Err(RelayError::new(ErrorCode::NoWriteAccess, "credential lacks push/admin access to this repository"));
    }

    with_retry(engine.retry_policy, || labels::ensure_labels_exist(&engine.github))
        .await
        .map_err(github_err)?;

    let priority = req
        .priority
        .as_deref()
        .and_then(Priority::parse_label)
        .or_else(|| Priority::parse_label(&engine.config.github.default_priority))
        .unwrap_or(Priority::Medium);
    let issue_type = req
        .issue_type
        .as_deref()
        .and_then(IssueType::parse_label)
        .or_else(|| IssueType::parse_label(&engine.config.github.default_type))
        .unwrap_or(IssueType::Feature);

    let body = format_body(&req);
    let label_set = vec![priority.label().to_string(), issue_type.label().to_string(), "status:backlog".to_string()];

    let issue = with_retry(engine.retry_policy, || {
        issues::create_issue(&engine.github, &req.title, &body, label_set.clone())
    })
    .await
    .map_err(github_err)?;

    let record = AuditRecord::new(&engine.session_id, "create_issue", engine.owner(), engine.repo(), Outcome::Success)
        .with_issue(issue.number);
    let _ = engine.audit.append(&record);

    Ok(issue)
}

pub async fn list_backlog(engine: &Engine, req: ListBacklogRequest) -> Result<ListBacklogResponse> {
    let open = with_retry(engine.retry_policy, || issues::list_open_issues(&engine.github))
        .await
        .map_err(github_err)?;

    let include_types = parse_types(req.include_types.as_deref());
    let exclude_types = parse_types(req.exclude_types.as_deref());
    let filter_opts = FilterOptions { include_types, exclude_types };
    let filtered = apply_filters(open, &filter_opts);
    let total_candidates = filtered.len();

    let now = chrono::Utc::now();
    let mut annotated = Vec::with_capacity(filtered.len());
    for issue in filtered {
        let parent = sub_issues::get_parent(&engine.github, issue.number).await;
        let has_open_parent = matches!(&parent, Some(p) if p.state == IssueState::Open);
        let blocked_by = parent.as_ref().filter(|_| has_open_parent).map(|p| p.number);

        let score = calculate_score(&issue, ScoringContext { has_open_parent }, now);
        let key = relay_store::LockKey {
            owner: issue.owner.clone(),
            repo: issue.repo.clone(),
            issue_number: issue.number,
        };
        let is_locked = engine.locks.is_locked(&key).unwrap_or(false);
        let locked_by = if is_locked { engine.locks.read(&key).ok().flatten().map(|l| l.session_id) } else { None };

        annotated.push(AnnotatedIssue { issue, score, is_locked, locked_by, blocked_by });
    }

    annotated.sort_by(|a, b| {
        b.score
            .total_score
            .partial_cmp(&a.score.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.score.issue_number.cmp(&b.score.issue_number))
    });

    let limit = req.limit.unwrap_or(20).clamp(1, 100) as usize;
    annotated.truncate(limit);

    let record = AuditRecord::new(&engine.session_id, "list_backlog", engine.owner(), engine.repo(), Outcome::Success);
    let _ = engine.audit.append(&record);

    Ok(ListBacklogResponse { issues: annotated, total_candidates })
}

fn parse_types(values: Option<&[String]>) -> Option<Vec<IssueType>> {
    values.map(|v| v.iter().filter_map(|s| IssueType::parse_label(s)).collect())
}

pub async fn sync_backlog_labels(engine: &Engine, req: SyncBacklogLabelsRequest) -> Result<SyncBacklogLabelsResponse> {
    with_retry(engine.retry_policy, || labels::ensure_labels_exist(&engine.github))
        .await
        .map_err(github_err)?;

    let open = with_retry(engine.retry_policy, || issues::list_open_issues(&engine.github))
        .await
        .map_err(github_err)?;

    let mut missing_priority = Vec::new();
    let mut missing_type = Vec::new();
    let mut missing_status = Vec::new();
    let mut updated = Vec::new();

    let default_priority = Priority::parse_label(&engine.config.github.default_priority).unwrap_or(Priority::Medium);
    let default_type = IssueType::parse_label(&engine.config.github.default_type).unwrap_or(IssueType::Feature);

    for issue in &open {
        let missing_p = issue.priority().is_none();
        let missing_t = issue.issue_type().is_none();
        let missing_s = issue.status().is_none();

        if missing_p {
            missing_priority.push(issue.number);
        }
        if missing_t {
            missing_type.push(issue.number);
        }
        if missing_s {
            missing_status.push(issue.number);
        }

        if req.mode == SyncMode::Update && (missing_p || missing_t || missing_s) {
            if missing_p {
                labels::add_label(&engine.github, issue.number, default_priority.label())
                    .await
                    .map_err(github_err)?;
            }
            if missing_t {
                labels::add_label(&engine.github, issue.number, default_type.label())
                    .await
                    .map_err(github_err)?;
            }
            if missing_s {
                labels::add_label(&engine.github, issue.number, "status:backlog")
                    .await
                    .map_err(github_err)?;
            }
            updated.push(issue.number);
        }
    }

    let record = AuditRecord::new(&engine.session_id, "sync_backlog_labels", engine.owner(), engine.repo(), Outcome::Success);
    let _ = engine.audit.append(&record);

    Ok(SyncBacklogLabelsResponse { missing_priority, missing_type, missing_status, updated })
}

pub async fn bulk_update_issues(engine: &Engine, req: BulkUpdateIssuesRequest) -> Result<BulkUpdateIssuesResponse> {
    if req.issue_numbers.is_empty() || req.issue_numbers.len() > 50 {
        return Err(RelayError::new(ErrorCode::InternalError, "issue_numbers must contain between 1 and 50 entries"));
    }

    let mut updated = Vec::new();
    let mut failed = Vec::new();

    for number in req.issue_numbers {
        let result = apply_bulk_update(engine, number, &req).await;
        match result {
            Ok(()) => updated.push(number),
            Err(e) => failed.push(BulkUpdateFailure { issue_number: number, error: e.to_string() }),
        }
    }

    let outcome = if failed.is_empty() { Outcome::Success } else { Outcome::Failure };
    let record = AuditRecord::new(&engine.session_id, "bulk_update_issues", engine.owner(), engine.repo(), outcome);
    let _ = engine.audit.append(&record);

    Ok(BulkUpdateIssuesResponse { updated, failed })
}

async fn apply_bulk_update(
    engine: &Engine,
    number: u64,
    req: &BulkUpdateIssuesRequest,
) -> std::result::Result<(), relay_github::GitHubError> {
    if let Some(add) = &req.add_labels {
        for label in add {
            labels::add_label(&engine.github, number, label).await?;
        }
    }
    if let Some(remove) = &req.remove_labels {
        for label in remove {
            labels::remove_label(&engine.github, number, label).await?;
        }
    }
    if let Some(state) = &req.state {
        let parsed = if state.eq_ignore_ascii_case("closed") { IssueState::Closed } else { IssueState::Open };
        issues::set_issue_state(&engine.github, number, parsed).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_body_overrides_the_template() {
        let req = CreateIssueRequest { body: Some("just this".to_string()), ..Default::default() };
        assert_eq!(format_body(&req), "just this");
    }

    #[test]
    fn template_assembles_every_supplied_section() {
        let req = CreateIssueRequest {
            title: "fix the thing".to_string(),
            context: Some("users hit a 500".to_string()),
            acceptance_criteria: vec!["returns 200".to_string(), "logs the cause".to_string()],
            technical_notes: Some("check the retry loop".to_string()),
            ..Default::default()
        };
        let body = format_body(&req);
        assert!(body.contains("## Summary\nfix the thing\n"));
        assert!(body.contains("## Context\nusers hit a 500\n"));
        assert!(body.contains("- [ ] returns 200\n"));
        assert!(body.contains("- [ ] logs the cause\n"));
        assert!(body.contains("## Technical Notes\ncheck the retry loop\n"));
    }

    #[test]
    fn template_omits_absent_sections() {
        let req = CreateIssueRequest { title: "bare issue".to_string(), ..Default::default() };
        let body = format_body(&req);
        assert_eq!(body, "## Summary\nbare issue\n");
    }

    #[test]
    fn parse_types_maps_known_labels_and_drops_unknown_ones() {
        let values = vec!["bug".to_string(), "not-a-type".to_string(), "docs".to_string()];
        let parsed = parse_types(Some(&values)).unwrap();
        assert_eq!(parsed, vec![IssueType::Bug, IssueType::Docs]);
    }

    #[test]
    fn parse_types_passes_through_none() {
        assert!(parse_types(None).is_none());
    }
}
