use std::collections::HashSet;

use relay_core::issue::{Issue, IssueState};

use crate::client::{GitHubClient, Result};

/// List open issues for the configured repository, paginated, with pull
/// requests filtered out (octocrab's issue listing includes PRs; GitHub's
/// REST issues endpoint represents PRs as issues with a `pull_request`
/// field, which we drop here since this engine treats PRs separately).
pub async fn list_open_issues(client: &GitHubClient) -> Result<Vec<Issue>> {
    let issue_handler = client.octocrab.issues(&client.owner, &client.repo);
    let mut all = Vec::new();
    let mut page: u32 = 1;

    loop {
        let response = issue_handler
            .list()
            .state(octocrab::params::State::Open)
            .per_page(100)
            .page(page)
            .send()
            .await?;

        let got_any = !response.items.is_empty();
        for item in response.items {
            if item.pull_request.is_none() {
                all.push(octocrab_issue_to_issue(&client.owner, &client.repo, item));
            }
        }

        if !got_any || response.next.is_none() {
            break;
        }
        page += 1;
    }

    Ok(all)
}

pub async fn get_issue(client: &GitHubClient, number: u64) -> Result<Issue> {
    let issue = client
        .octocrab
        .issues(&client.owner, &client.repo)
        .get(number)
        .await?;
    Ok(octocrab_issue_to_issue(&client.owner, &client.repo, issue))
}

pub async fn create_issue(
    client: &GitHubClient,
    title: &str,
    body: &str,
    labels: Vec<String>,
) -> Result<Issue> {
    let issue = client
        .octocrab
        .issues(&client.owner, &client.repo)
        .create(title)
        .body(body)
        .labels(labels)
        .send()
        .await?;
    Ok(octocrab_issue_to_issue(&client.owner, &client.repo, issue))
}

pub async fn set_issue_state(client: &GitHubClient, number: u64, state: IssueState) -> Result<()> {
    let param = match state {
        IssueState::Open => octocrab::models::IssueState::Open,
        IssueState::Closed => octocrab::models::IssueState::Closed,
    };
    client
        .octocrab
        .issues(&client.owner, &client.repo)
        .update(number)
        .state(param)
        .send()
        .await?;
    Ok(())
}

pub async fn add_comment(client: &GitHubClient, number: u64, body: &str) -> Result<()> {
    client
        .octocrab
        .issues(&client.owner, &client.repo)
        .create_comment(number, body)
        .await?;
    Ok(())
}

/// Verify the current credential has push/write access to the repository,
/// surfaced to callers as a first-class `NO_WRITE_ACCESS` check.
pub async fn verify_write_access(client: &GitHubClient) -> Result<bool> {
    let repo = client
        .octocrab
        .repos(&client.owner, &client.repo)
        .get()
        .await?;
    Ok(repo
        .permissions
        .map(|p| p.push || p.admin)
        .unwrap_or(false))
}

fn octocrab_issue_to_issue(owner: &str, repo: &str, issue: octocrab::models::issues::Issue) -> Issue {
    let state = match issue.state {
        octocrab::models::IssueState::Open => IssueState::Open,
        octocrab::models::IssueState::Closed => IssueState::Closed,
        _ => IssueState::Open,
    };

    let labels: HashSet<String> = issue.labels.iter().map(|l| l.name.clone()).collect();
    let assignees = issue.assignees.iter().map(|a| a.login.clone()).collect();

    Issue {
        owner: owner.to_string(),
        repo: repo.to_string(),
        number: issue.number,
        title: issue.title,
        body: issue.body,
        state,
        created_at: issue.created_at,
        updated_at: issue.updated_at,
        labels,
        assignees,
        html_url: issue.html_url.to_string(),
    }
}
