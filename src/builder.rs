use std::{path::PathBuf, time::Duration};

use anyhow::{anyhow, Context};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::{
    config::DispatchConfig,
    dispatch::BuildRequest,
    webhooks::{github::PullRequestRef, InboundEvent},
};

mod git;

mod sphinx;
use sphinx::SphinxBuild;

pub(crate) mod utils;
use utils::ensure_absent;

#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub scratch_dir: PathBuf,
    pub output_root: PathBuf,
    pub docs_source: PathBuf,
    pub sphinx_build: String,
    pub timeout: Option<Duration>,
}

impl From<&DispatchConfig> for BuildSettings {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            scratch_dir: config.scratch_dir.clone(),
            output_root: config.output_root().to_path_buf(),
            docs_source: config.docs_source.clone(),
            sphinx_build: config.sphinx_build.clone(),
            timeout: config.build_timeout(),
        }
    }
}

impl BuildSettings {
    pub fn output_dir(&self, pr: &PullRequestRef) -> PathBuf {
        self.output_root.join(format!("pr-{}", pr.pr_number))
    }
}

/// Checks out pull requests and renders their documentation, one at a time.
pub struct Builder {
    settings: BuildSettings,
}

impl Builder {
    pub fn new(settings: BuildSettings) -> Self {
        Self { settings }
    }

    /// Builds every request sent on `requests`, until all senders are dropped.
    ///
    /// Failures are logged and don't stop the loop: nobody is waiting for the result.
    pub async fn run(&self, mut requests: UnboundedReceiver<BuildRequest>) {
        debug!("running...");

        loop {
            let request = match requests.recv().await {
                Some(request) => request,
                None => {
                    info!("all channel senders were dropped, exiting build loop");
                    break;
                }
            };

            if let Err(e) = self.handle_request(request).await {
                warn!("encountered error while building docs: {:#}", e);
            }
        }
    }

    pub async fn handle_request(&self, request: BuildRequest) -> anyhow::Result<PathBuf> {
        let pr = pull_request(&request.event)?;

        match self.settings.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.build(&pr))
                .await
                .map_err(|_| {
                    anyhow!(
                        "build of PR #{} timed out after {:?}",
                        pr.pr_number,
                        timeout
                    )
                })?,
            None => self.build(&pr).await,
        }
    }

    async fn build(&self, pr: &PullRequestRef) -> anyhow::Result<PathBuf> {
        let repo_path = &self.settings.scratch_dir;
        info!(
            "building docs for PR #{} of {}",
            pr.pr_number, pr.repository_url
        );

        ensure_absent(repo_path)
            .await
            .with_context(|| format!("couldn't clear {}", repo_path.display()))?;
        git::clone(&pr.repository_url, repo_path)
            .await
            .with_context(|| format!("couldn't clone {}", pr.repository_url))?;
        git::checkout_pull_request(repo_path, pr)
            .await
            .with_context(|| format!("couldn't check out PR #{}", pr.pr_number))?;

        let sphinx = SphinxBuild {
            executable: &self.settings.sphinx_build,
            source_dir: repo_path.join(&self.settings.docs_source),
            output_dir: self.settings.output_dir(pr),
        };
        sphinx
            .run(repo_path)
            .await
            .context("couldn't render documentation")?;

        info!(
            "built docs for PR #{} in {}",
            pr.pr_number,
            sphinx.output_dir.display()
        );
        Ok(sphinx.output_dir)
    }
}

fn pull_request(event: &InboundEvent) -> anyhow::Result<PullRequestRef> {
    let payload = event
        .decode_body()
        .context("couldn't decode event body")?;
    PullRequestRef::from_slice(&payload).context("couldn't parse pull request payload")
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc::unbounded_channel;

    use super::*;

    fn settings(name: &str) -> BuildSettings {
        let scratch_dir = std::env::temp_dir().join(format!(
            "docs-dispatch-build-{}-{}",
            name,
            std::process::id()
        ));
        BuildSettings {
            output_root: scratch_dir.clone(),
            scratch_dir,
            docs_source: PathBuf::from("docs/source"),
            sphinx_build: "sphinx-build".to_string(),
            timeout: Some(Duration::from_secs(30)),
        }
    }

    fn request(body: &str) -> BuildRequest {
        BuildRequest {
            event: InboundEvent {
                body: body.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_settings_from_config() {
        let config: DispatchConfig = serde_yaml::from_str(
            "github_repository: conda/conda\nscratch_dir: /tmp/conda\nbuild_timeout_secs: 60\n",
        )
        .unwrap();

        let settings = BuildSettings::from(&config);
        let pr = PullRequestRef::from_slice(
            br#"{"number": 8390, "repository": {"html_url": "https://github.com/conda/conda"}}"#,
        )
        .unwrap();

        assert_eq!(settings.output_dir(&pr), PathBuf::from("/tmp/conda/pr-8390"));
        assert_eq!(settings.timeout, Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_unparseable_request_fails() {
        let builder = Builder::new(settings("unparseable"));

        assert!(builder.handle_request(request("{}")).await.is_err());
    }

    #[tokio::test]
    async fn test_clone_failure_is_an_error() {
        let settings = settings("clone");
        let scratch_dir = settings.scratch_dir.clone();
        tokio::fs::create_dir_all(scratch_dir.join("stale")).await.unwrap();
        let builder = Builder::new(settings);

        let missing_repo = std::env::temp_dir().join("docs-dispatch-no-such-repository");
        let body = format!(
            r#"{{"number": 42, "repository": {{"html_url": "file://{}"}}}}"#,
            missing_repo.display()
        );

        assert!(builder.handle_request(request(&body)).await.is_err());
        // the previous working copy was cleared before cloning
        assert!(!scratch_dir.join("stale").exists());
    }

    #[tokio::test]
    async fn test_run_survives_failures() {
        let builder = Builder::new(settings("loop"));
        let (sender, receiver) = unbounded_channel();

        sender.send(request("not json")).unwrap();
        sender.send(request("{}")).unwrap();
        drop(sender);

        // returns once the channel is drained and closed
        builder.run(receiver).await;
    }
}
