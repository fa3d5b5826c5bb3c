use std::path::Path;

use tokio::process::Command;
use url::Url;

use crate::{builder::utils::run, webhooks::github::PullRequestRef};

fn git(work_dir: Option<&Path>) -> Command {
    let mut command = Command::new("git");
    if let Some(dir) = work_dir {
        command.current_dir(dir);
    }
    command
}

pub(crate) async fn clone(repository: &Url, into: &Path) -> anyhow::Result<()> {
    let mut command = git(None);
    command.arg("clone").arg(repository.as_str()).arg(into);
    run(command).await
}

/// Fetches the head of the pull request into its local branch and checks it out.
pub(crate) async fn checkout_pull_request(repo: &Path, pr: &PullRequestRef) -> anyhow::Result<()> {
    let mut fetch = git(Some(repo));
    fetch.args(["fetch", "origin", &pr.head_refspec()]);
    run(fetch).await?;

    let mut checkout = git(Some(repo));
    checkout.args(["checkout", &pr.branch()]);
    run(checkout).await
}
