use crate::client::{GitHubClient, Result};
use crate::types::CheckStatus;

/// Aggregate check-run conclusions for a commit ref:
/// `none` when no runs; `failing` if any run's conclusion is
/// failure/timed_out/cancelled; else `pending` if any run is
/// queued/in_progress; else `passing`.
pub async fn aggregate_check_status(client: &GitHubClient, git_ref: &str) -> Result<CheckStatus> {
    let page = client
        .octocrab
        .checks(&client.owner, &client.repo)
        .list_check_runs_for_git_ref(octocrab::params::repos::Commitish::from(git_ref.to_string()))
        .send()
        .await?;

    if page.check_runs.is_empty() {
        return Ok(CheckStatus::None);
    }

    let mut any_pending = false;
    for run in &page.check_runs {
        let conclusion = run.conclusion.as_deref();
        let status = run.status.as_str();

        if matches!(conclusion, Some("failure") | Some("timed_out") | Some("cancelled")) {
            return Ok(CheckStatus::Failing);
        }
        if matches!(status, "queued" | "in_progress") {
            any_pending = true;
        }
    }

    Ok(if any_pending {
        CheckStatus::Pending
    } else {
        CheckStatus::Passing
    })
}
