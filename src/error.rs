use thiserror::Error;

pub const CONFLICT_MESSAGE: &str = "A campaign with the provided query text has already been created";

#[derive(Error, Debug)]
pub enum CampaignError {
    /// Caller mistake detected before anything was opened.
    #[error("invalid request: {0}")]
    Usage(String),
    #[error("could not establish campaign stream: {0}")]
    Establishment(String),
    #[error("{}", CONFLICT_MESSAGE)]
    Conflict,
    #[error("protocol error: {0}")]
    Protocol(#[from] DecodeError),
    /// Carries the last `error` frame the server sent before closing, if any.
    #[error("channel closed by server before the campaign finished{}", closed_reason(.0))]
    ChannelClosed(Option<String>),
    #[error("transport error: {0}")]
    Transport(String),
}

fn closed_reason(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!(": {r}"))
        .unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("invalid lifecycle transition from {from:?} to {to:?}")]
pub struct LifecycleError {
    pub from: crate::model::LifecycleState,
    pub to: crate::model::LifecycleState,
}
