use relay_core::issue::{Issue, IssueState};
use serde::Deserialize;

use crate::client::GitHubClient;

#[derive(Debug, Deserialize)]
struct SubIssueParent {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    html_url: String,
    #[serde(default)]
    labels: Vec<LabelShape>,
    #[serde(default)]
    assignees: Vec<UserShape>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize)]
struct LabelShape {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserShape {
    login: String,
}

/// Look up this issue's parent via the sub-issues API. This is advisory
///: it MUST degrade to `None` on any error rather than
/// propagate — a missing/unsupported endpoint, permissions error, or
/// malformed response all mean "no parent".
pub async fn get_parent(client: &GitHubClient, issue_number: u64) -> Option<Issue> {
    let route = format!(
        "/repos/{}/{}/issues/{}/parent",
        client.owner, client.repo, issue_number
    );

    let parent: SubIssueParent = match client.octocrab.get(route, None::<&()>).await {
        Ok(p) => p,
        Err(_) => return None,
    };

    let state = if parent.state == "closed" {
        IssueState::Closed
    } else {
        IssueState::Open
    };

    Some(Issue {
        owner: client.owner.clone(),
        repo: client.repo.clone(),
        number: parent.number,
        title: parent.title,
        body: parent.body,
        state,
        created_at: parent.created_at,
        updated_at: parent.updated_at,
        labels: parent.labels.into_iter().map(|l| l.name).collect(),
        assignees: parent.assignees.into_iter().map(|u| u.login).collect(),
        html_url: parent.html_url,
    })
}

/// `true` iff the issue has a parent that is still open — the input to the
/// blocked-penalty term of the priority model.
pub async fn has_open_parent(client: &GitHubClient, issue_number: u64) -> bool {
    matches!(
        get_parent(client, issue_number).await,
        Some(parent) if parent.state == IssueState::Open
    )
}
