use rocket::State;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    dispatch::{DispatchOutcome, Dispatcher, InvokeError},
    webhooks::InboundEvent,
};

mod events;
pub use events::PullRequestRef;

mod files;
pub use files::{touches_docs, ChangedFile, ChangedFiles, GitHubApi};

mod signing;
pub use signing::{verify_signature, SignatureVerdict};

const X_GITHUB_EVENT: &str = "X-GitHub-Event";

pub struct GitHubSecret(pub String);

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing {} header", X_GITHUB_EVENT)]
    BadRequest,
    #[error("ohhhh no {0}")]
    Signature(SignatureVerdict),
    #[error("couldn't decode body: {0}")]
    MalformedBody(#[from] base64::DecodeError),
    #[error("couldn't parse pull request payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
    #[error("couldn't list changed files: {0:#}")]
    UpstreamFetch(anyhow::Error),
    #[error("couldn't start docs build: {0}")]
    Invoke(#[from] InvokeError),
}

impl From<WebhookError> for DispatchOutcome {
    fn from(err: WebhookError) -> Self {
        let status_code = match err {
            WebhookError::BadRequest
            | WebhookError::MalformedBody(_)
            | WebhookError::MalformedPayload(_) => 400,
            WebhookError::Signature(_) => 500,
            WebhookError::UpstreamFetch(_) => 502,
            WebhookError::Invoke(_) => 503,
        };

        Self {
            status_code,
            body: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitHubEventType {
    PullRequest,
    Other(String),
}

pub fn classify_event_type(event: &InboundEvent) -> Result<GitHubEventType, WebhookError> {
    match event.header(X_GITHUB_EVENT) {
        Some("pull_request") => Ok(GitHubEventType::PullRequest),
        Some(other) if !other.is_empty() => Ok(GitHubEventType::Other(other.to_owned())),
        _ => Err(WebhookError::BadRequest),
    }
}

/// Decides whether a webhook delivery is authentic and touches the documentation.
pub struct Gatekeeper {
    secret: GitHubSecret,
    files: Box<dyn ChangedFiles>,
    docs_marker: String,
}

impl Gatekeeper {
    pub fn new(secret: GitHubSecret, files: Box<dyn ChangedFiles>, docs_marker: String) -> Self {
        Self {
            secret,
            files,
            docs_marker,
        }
    }

    pub fn verify(&self, event: &InboundEvent) -> SignatureVerdict {
        verify_signature(event, &self.secret.0)
    }

    pub async fn docs_changed(&self, pr_number: u64) -> Result<bool, WebhookError> {
        let files = self
            .files
            .changed_files(pr_number)
            .await
            .map_err(WebhookError::UpstreamFetch)?;

        Ok(touches_docs(&files, &self.docs_marker))
    }
}

#[rocket::post("/api/webhooks/github", data = "<event>")]
pub async fn github_webhook(
    event: InboundEvent,
    gatekeeper: &State<Gatekeeper>,
    dispatcher: &State<Dispatcher>,
) -> DispatchOutcome {
    let outcome = match handle_event(&event, gatekeeper, dispatcher).await {
        Ok(outcome) => outcome,
        Err(err) => {
            warn!("rejecting GitHub webhook: {}", err);
            err.into()
        }
    };

    info!("{:?}", outcome);
    outcome
}

/// Runs one delivery through the whole pipeline: event type, signature, body, payload, changed
/// files, and finally the build hand-off.
pub async fn handle_event(
    event: &InboundEvent,
    gatekeeper: &Gatekeeper,
    dispatcher: &Dispatcher,
) -> Result<DispatchOutcome, WebhookError> {
    let event_type = classify_event_type(event)?;

    match gatekeeper.verify(event) {
        SignatureVerdict::Valid => {}
        verdict => return Err(WebhookError::Signature(verdict)),
    }

    if let GitHubEventType::Other(kind) = event_type {
        debug!("ignoring `{}` event", kind);
        return Ok(DispatchOutcome::accepted(format!("ignoring {} event", kind)));
    }

    let payload = event.decode_body()?;
    let pr = PullRequestRef::from_slice(&payload)?;
    debug!(
        "received pull request #{} on {}",
        pr.pr_number, pr.repository_url
    );

    let docs_changed = gatekeeper.docs_changed(pr.pr_number).await?;
    Ok(dispatcher.dispatch(event, docs_changed)?)
}
