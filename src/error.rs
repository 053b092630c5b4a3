//! Crate-wide error type.
//!
//! Reconciler functions never panic, since a logic bug in one key must
//! not stall the worker processing it forever; they return a `Result`
//! and the worker loop's `finish` helper decides the requeue backoff.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("referenced object not found: {0}")]
    NotFound(String),

    #[error("object is misbound: {0}")]
    Misbound(String),

    #[error("restore from this snapshot is in flight, deferring deletion")]
    RestoreInFlight,

    #[error("snapshot is still a member of group {0}")]
    GroupMembership(String),

    #[error("finalizer patch failed for {0}: {1}")]
    FinalizerPatch(String, String),

    #[error("json patch error: {0}")]
    JsonPatch(#[from] json_patch::PatchError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// True for errors that are expected under normal operation — a
    /// conflicting write or a momentarily missing object — and should be
    /// retried silently at low log verbosity rather than logged as a
    /// warning.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Kube(kube::Error::Api(resp)) => resp.code == 409 || resp.code == 500,
            Error::NotFound(_) => true,
            _ => false,
        }
    }
}
