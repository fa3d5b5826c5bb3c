use rocket::{
    http::Status,
    response::{self, Responder},
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, trace};

use crate::webhooks::InboundEvent;

pub const NO_DOCS_CHANGES: &str = "no docs changes";
pub const BUILDING_DOCS_CHANGE: &str = "building docs change";

/// What the webhook sender gets back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub status_code: u16,
    pub body: String,
}

impl DispatchOutcome {
    pub fn accepted(body: impl Into<String>) -> Self {
        Self {
            status_code: Status::Accepted.code,
            body: body.into(),
        }
    }
}

impl<'r> Responder<'r, 'static> for DispatchOutcome {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        (Status::new(self.status_code), self.body).respond_to(request)
    }
}

/// Task handed to the build worker: the whole original event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub event: InboundEvent,
}

#[derive(Debug, Error)]
#[error("the build worker isn't accepting requests anymore")]
pub struct InvokeError;

/// Fire-and-forget hand-off of a build. Success only means the request was accepted.
pub trait BuildInvoker: Send + Sync {
    fn invoke(&self, request: BuildRequest) -> Result<(), InvokeError>;
}

pub struct ChannelInvoker(pub UnboundedSender<BuildRequest>);

impl BuildInvoker for ChannelInvoker {
    fn invoke(&self, request: BuildRequest) -> Result<(), InvokeError> {
        self.0.send(request).map_err(|_| InvokeError)
    }
}

pub struct Dispatcher {
    invoker: Box<dyn BuildInvoker>,
}

impl Dispatcher {
    pub fn new(invoker: Box<dyn BuildInvoker>) -> Self {
        Self { invoker }
    }

    /// Requests a build of `event` if it changed the documentation. Never waits for the build.
    pub fn dispatch(
        &self,
        event: &InboundEvent,
        docs_changed: bool,
    ) -> Result<DispatchOutcome, InvokeError> {
        if !docs_changed {
            trace!("no documentation change, nothing to build");
            return Ok(DispatchOutcome::accepted(NO_DOCS_CHANGES));
        }

        info!("passing off build");
        self.invoker.invoke(BuildRequest {
            event: event.clone(),
        })?;

        Ok(DispatchOutcome::accepted(BUILDING_DOCS_CHANGE))
    }
}
