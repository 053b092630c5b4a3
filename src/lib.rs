//! `snapshot-controller`: the control-plane reconciler for a cluster-scoped
//! volume snapshot subsystem (Snapshot / SnapshotContent / SnapshotClass,
//! plus the optional grouped counterparts behind `group-snapshots`).
//!
//! This crate never talks to a storage driver itself — that is the job of
//! the external CSI sidecar. It maintains the bi-directional binding
//! between a Snapshot and its Content, the finalizers that gate deletion,
//! and the status fields copied from Content to Snapshot.

pub mod api_ops;
pub mod binding;
pub mod clients;
pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod finalizers;
pub mod metrics;
pub mod queue;
pub mod reconcile;
#[cfg(feature = "rest-api")]
pub mod rest_api;
pub mod status;
pub mod store;
pub mod telemetry;
pub mod util;

pub use error::{Error, Result};
