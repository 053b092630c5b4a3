//! Reconcilers: the state machines that sync snapshots, contents, and
//! (optionally) their group counterparts. Each submodule owns the state
//! machine for one resource kind; all API access goes through
//! `crate::clients::Clients` so the same code runs against `MockApiOps` in
//! tests and `KubeApiOps` in production.

pub mod content;
#[cfg(feature = "group-snapshots")]
pub mod group;
#[cfg(feature = "group-snapshots")]
pub mod group_content;
pub mod snapshot;

/// What a worker should do with the key once a reconcile pass returns.
///
/// Distinguishing `Requeue` from `Err` lets a reconciler ask for another
/// pass (e.g. "restore still in flight, check back soon") without that
/// pause being logged and counted as a failure the way a real error is.
#[derive(Debug)]
pub enum Outcome {
    Synced,
    Requeue,
}

pub type ReconcileResult = crate::error::Result<Outcome>;
