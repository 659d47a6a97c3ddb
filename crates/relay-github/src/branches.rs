use octocrab::params::repos::Reference;

use crate::client::{GitHubClient, Result};

/// The repository's default branch name (used as a PR base).
pub async fn get_default_branch(client: &GitHubClient) -> Result<String> {
    let repo_info = client.octocrab.repos(&client.owner, &client.repo).get().await?;
    Ok(repo_info.default_branch.unwrap_or_else(|| "main".to_string()))
}

/// Create a branch named `branch_name` from the repository's default head.
pub async fn create_branch_from_default_head(client: &GitHubClient, branch_name: &str) -> Result<()> {
    let repos = client.octocrab.repos(&client.owner, &client.repo);

    let repo_info = repos.get().await?;
    let default_branch = repo_info.default_branch.unwrap_or_else(|| "main".to_string());

    let default_ref = repos
        .get_ref(&Reference::Branch(default_branch))
        .await?;

    let sha = match default_ref.object {
        octocrab::models::repos::Object::Commit { sha, .. } => sha,
        octocrab::models::repos::Object::Tag { sha, .. } => sha,
        _ => return Err(crate::client::GitHubError::MissingToken), // unreachable in practice
    };

    repos
        .create_ref(&Reference::Branch(branch_name.to_string()), sha)
        .await?;

    Ok(())
}

/// Derive the canonical branch name: `<issueNumber>-<slug>`, where slug
/// is the title lower-cased, non-alphanumerics collapsed to single hyphens,
/// truncated to 50 chars with trailing hyphens stripped.
pub fn branch_name(issue_number: u64, title: &str) -> String {
    let mut slug = String::new();
    let mut last_was_dash = false;
    for c in title.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let slug = slug.trim_matches('-');
    let truncated: String = slug.chars().take(50).collect();
    let truncated = truncated.trim_end_matches('-');
    format!("{issue_number}-{truncated}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_and_truncates() {
        let name = branch_name(42, "Fix the Thing!! (urgent)");
        assert_eq!(name, "42-fix-the-thing-urgent");
    }

    #[test]
    fn truncates_to_50_chars_stripping_trailing_dash() {
        let title = "a".repeat(60);
        let name = branch_name(1, &title);
        // "1-" + 50 chars
        assert_eq!(name, format!("1-{}", "a".repeat(50)));
    }

    #[test]
    fn collapses_runs_of_non_alphanumerics() {
        let name = branch_name(7, "foo   ---   bar");
        assert_eq!(name, "7-foo-bar");
    }
}
