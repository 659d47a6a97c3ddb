//! `get_pr_status`.

use relay_core::error::Result;
use relay_github::{checks, pull_requests, reviews, with_retry};
use relay_github::types::PrStatus;

use crate::dto::GetPrStatusRequest;
use crate::engine::{github_err, Engine};

pub async fn get_pr_status(engine: &Engine, req: GetPrStatusRequest) -> Result<PrStatus> {
    let pr = with_retry(engine.retry_policy, || pull_requests::get_pull_request(&engine.github, req.pr_number))
        .await
        .map_err(github_err)?;

    let checks = with_retry(engine.retry_policy, || checks::aggregate_check_status(&engine.github, &pr.head_branch))
        .await
        .map_err(github_err)?;

    let (review, reviewers) = with_retry(engine.retry_policy, || reviews::aggregate_review_status(&engine.github, req.pr_number))
        .await
        .map_err(github_err)?;

    Ok(PrStatus { pr, checks, review, reviewers })
}
