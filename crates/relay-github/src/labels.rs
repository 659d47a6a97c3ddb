use relay_core::issue::managed_label_families;

use crate::client::{GitHubClient, GitHubError, Result};

/// Idempotent create-if-missing across the three label families. Repeated invocations cause no change after the first.
pub async fn ensure_labels_exist(client: &GitHubClient) -> Result<()> {
    let handler = client.octocrab.issues(&client.owner, &client.repo);

    for (name, color, description) in managed_label_families() {
        match handler.get_label(name).await.map_err(GitHubError::from) {
            Ok(_) => continue,
            Err(GitHubError::Api(octocrab::Error::GitHub { source, .. }))
                if source.status_code.as_u16() == 404 =>
            {
                handler.create_label(name, color, description).await?;
            }
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

/// Add a label to an issue. A no-op success if already present.
pub async fn add_label(client: &GitHubClient, number: u64, label: &str) -> Result<()> {
    let handler = client.octocrab.issues(&client.owner, &client.repo);
    match handler.add_labels(number, &[label.to_string()]).await {
        Ok(_) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Remove a label from an issue. A no-op success if absent.
pub async fn remove_label(client: &GitHubClient, number: u64, label: &str) -> Result<()> {
    let handler = client.octocrab.issues(&client.owner, &client.repo);
    match handler.remove_label(number, label).await.map_err(GitHubError::from) {
        Ok(_) => Ok(()),
        Err(GitHubError::Api(octocrab::Error::GitHub { source, .. }))
            if source.status_code.as_u16() == 404 =>
        {
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Replace one label with another (used for advisory-status flips).
pub async fn replace_label(client: &GitHubClient, number: u64, old: &str, new: &str) -> Result<()> {
    remove_label(client, number, old).await?;
    add_label(client, number, new).await
}
