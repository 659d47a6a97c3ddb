use std::collections::HashSet;

use crate::client::{GitHubClient, Result};
use crate::types::ReviewStatus;

/// Aggregate PR review state: `approved` iff any review is
/// APPROVED; `changesRequested` iff any is CHANGES_REQUESTED; reviewers are
/// deduplicated by login.
pub async fn aggregate_review_status(
    client: &GitHubClient,
    pr_number: u64,
) -> Result<(ReviewStatus, Vec<String>)> {
    let reviews = client
        .octocrab
        .pulls(&client.owner, &client.repo)
        .list_reviews(pr_number)
        .await?;

    let mut reviewers = HashSet::new();
    let mut approved = false;
    let mut changes_requested = false;
    let mut any = false;

    for review in reviews.items {
        any = true;
        if let Some(user) = &review.user {
            reviewers.insert(user.login.clone());
        }
        match review.state {
            Some(octocrab::models::pulls::ReviewState::Approved) => approved = true,
            Some(octocrab::models::pulls::ReviewState::ChangesRequested) => changes_requested = true,
            _ => {}
        }
    }

    let status = if approved {
        ReviewStatus::Approved
    } else if changes_requested {
        ReviewStatus::ChangesRequested
    } else if any {
        ReviewStatus::Pending
    } else {
        ReviewStatus::None
    };

    let mut reviewers: Vec<String> = reviewers.into_iter().collect();
    reviewers.sort();
    Ok((status, reviewers))
}
