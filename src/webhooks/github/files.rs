use std::time::Duration;

use anyhow::Context;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::{trace, warn};
use url::Url;

use crate::config::DispatchConfig;

// GitHub's maximum page size for this endpoint, and the number of pages it will serve (3000
// files).
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
}

/// Source of the list of files touched by a pull request.
#[rocket::async_trait]
pub trait ChangedFiles: Send + Sync {
    async fn changed_files(&self, pr_number: u64) -> anyhow::Result<Vec<ChangedFile>>;
}

/// Lists changed files through the GitHub REST API.
pub struct GitHubApi {
    client: Client,
    root_url: Url,
    repository: String,
    token: Option<String>,
}

impl GitHubApi {
    pub fn new(config: &DispatchConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("docs-dispatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("couldn't build GitHub API client")?;

        Ok(Self {
            client,
            root_url: config.github_api_url.clone(),
            repository: config.github_repository.clone(),
            token: config.github_api_token.clone(),
        })
    }

    fn files_url(&self, pr_number: u64, page: usize) -> String {
        format!(
            "{}/repos/{}/pulls/{}/files?per_page={}&page={}",
            self.root_url.as_str().trim_end_matches('/'),
            self.repository,
            pr_number,
            PER_PAGE,
            page
        )
    }
}

#[rocket::async_trait]
impl ChangedFiles for GitHubApi {
    async fn changed_files(&self, pr_number: u64) -> anyhow::Result<Vec<ChangedFile>> {
        let mut files = Vec::new();

        for page in 1..=MAX_PAGES {
            let url = self.files_url(pr_number, page);
            trace!("fetching {}", url);

            let mut request = self
                .client
                .get(&url)
                .header(header::ACCEPT, "application/vnd.github.v3+json");
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let batch: Vec<ChangedFile> = request
                .send()
                .await
                .with_context(|| format!("request to {} failed", url))?
                .error_for_status()?
                .json()
                .await
                .with_context(|| format!("couldn't parse file list from {}", url))?;

            let last_page = batch.len() < PER_PAGE;
            files.extend(batch);
            if last_page {
                trace!("pull request #{} changes {} files", pr_number, files.len());
                return Ok(files);
            }
        }

        warn!(
            "pull request #{} changes more files than GitHub lists, only the first {} were checked",
            pr_number,
            files.len()
        );
        Ok(files)
    }
}

/// Whether any of `files` lives under the documentation, i.e. has `marker` in its path.
pub fn touches_docs(files: &[ChangedFile], marker: &str) -> bool {
    files.iter().any(|file| file.filename.contains(marker))
}
