use crate::client::{GitHubClient, Result};
use crate::types::{PrState, PullRequest};

pub async fn create_pull_request(
    client: &GitHubClient,
    title: &str,
    body: &str,
    head: &str,
    base: &str,
) -> Result<PullRequest> {
    let pr = client
        .octocrab
        .pulls(&client.owner, &client.repo)
        .create(title, head, base)
        .body(body)
        .send()
        .await?;
    Ok(octocrab_pr_to_pr(pr))
}

pub async fn get_pull_request(client: &GitHubClient, number: u64) -> Result<PullRequest> {
    let pr = client
        .octocrab
        .pulls(&client.owner, &client.repo)
        .get(number)
        .await?;
    Ok(octocrab_pr_to_pr(pr))
}

fn octocrab_pr_to_pr(pr: octocrab::models::pulls::PullRequest) -> PullRequest {
    // merged iff closed AND merged flag true; otherwise
    // pass through open/closed.
    let state = if pr.merged_at.is_some() {
        PrState::Merged
    } else {
        match pr.state {
            Some(octocrab::models::IssueState::Closed) => PrState::Closed,
            _ => PrState::Open,
        }
    };

    let created_at = pr.created_at.unwrap_or_else(chrono::Utc::now);
    let updated_at = pr.updated_at.unwrap_or(created_at);

    PullRequest {
        number: pr.number,
        title: pr.title.unwrap_or_default(),
        body: pr.body,
        state,
        head_branch: pr.head.ref_field,
        base_branch: pr.base.ref_field,
        html_url: pr.html_url.map(|u| u.to_string()).unwrap_or_default(),
        created_at,
        updated_at,
        merged_at: pr.merged_at,
    }
}
