//! Error types for collaborator calls and controller operations.
//!
//! Binary-level plumbing uses `anyhow`; everything a caller may want to
//! match on is a `thiserror` enum here.

/// Failure of a call to the dashboard (executor, history, config store).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{message} ({code}, HTTP {status})")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

/// Structured failure result of `RunController::start`.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("Already running")]
    AlreadyRunning,

    /// The controller was stopped (or restarted) while the submit was in flight.
    #[error("Stopped before the run was accepted")]
    Superseded,

    #[error("Submit failed: {0}")]
    Submit(#[from] ClientError),
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    /// Every flag of the run is denylisted; there is nothing to project.
    #[error("No applicable parameters found to apply")]
    NoApplicableParams,

    #[error(transparent)]
    Store(#[from] ClientError),
}
