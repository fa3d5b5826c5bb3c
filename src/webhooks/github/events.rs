use serde::Deserialize;
use tracing::trace;
use url::Url;

/// The parts of a `pull_request` webhook payload needed to find and build the change.
#[derive(Debug, Deserialize)]
pub struct PullRequestEvent {
    pub number: u64,
    pub repository: Repository,
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub html_url: Url,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRef {
    pub repository_url: Url,
    pub pr_number: u64,
}

impl PullRequestRef {
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        let event: PullRequestEvent = serde_json::from_slice(payload)?;
        trace!(
            "pull request #{} action: {}",
            event.number,
            event.action.as_deref().unwrap_or("none")
        );
        Ok(event.into())
    }

    /// Local branch the pull request head is fetched into.
    pub fn branch(&self) -> String {
        format!("pr/{}", self.pr_number)
    }

    pub fn head_refspec(&self) -> String {
        format!("+refs/pull/{}/head:{}", self.pr_number, self.branch())
    }
}

impl From<PullRequestEvent> for PullRequestRef {
    fn from(event: PullRequestEvent) -> Self {
        Self {
            repository_url: event.repository.html_url,
            pr_number: event.number,
        }
    }
}
