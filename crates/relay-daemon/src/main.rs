//! C8 — bootstrap: credential resolution, session identity, directory
//! layout, logger and remote client installation, then begin serving.

mod transport;

use relay_core::config::Config;
use relay_core::repo::resolve_repo;
use relay_engine::Engine;
use relay_github::GitHubClient;
use relay_store::StoreLayout;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("warning: failed to load config, using defaults: {e}");
        Config::default()
    });

    let token = GitHubClient::resolve_token(None).map_err(|_| {
        anyhow::anyhow!(
            "no GitHub credential found — set GITHUB_TOKEN, pass a token explicitly, \
             or authenticate with `gh auth login` so `gh auth token` can supply one."
        )
    })?;

    let repo_ref = resolve_repo(None, &config).map_err(|e| anyhow::anyhow!("{}", e.message))?;

    let session_id = uuid::Uuid::new_v4().to_string();
    install_logging(&session_id);

    let layout = StoreLayout::new(config.base_dir());
    let github = GitHubClient::new(token, repo_ref.owner.clone(), repo_ref.repo.clone())?;
    let engine = Engine::new(github, config, session_id.clone(), layout)?;

    tracing::info!(session_id = %session_id, repo = %repo_ref.full_name(), "relay engine ready, serving stdio transport");

    transport::serve_stdio(&engine).await?;

    Ok(())
}

/// Install a process-wide structured logger keyed to the session id
///. Sink formatting beyond the structured record shape is
/// out of scope; this installs a JSON-formatted `tracing`
/// subscriber.
fn install_logging(session_id: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(true)
        .init();
    tracing::info!(session_id, "logger installed");
}
