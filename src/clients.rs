//! The set of `ApiOps` handles every reconciler needs, bundled once at
//! startup and threaded through by reference. Kept as trait objects so the
//! reconcile modules stay agnostic to whether they are driven by
//! `KubeApiOps` against a live cluster or `MockApiOps` in a test.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::Client;

use crate::api_ops::ApiOps;
use crate::crd::{
    GroupSnapshot, GroupSnapshotClass, GroupSnapshotContent, VolumeSnapshot, VolumeSnapshotClass,
    VolumeSnapshotContent,
};
use crate::queue::WorkQueue;

/// Bundled handles every reconciler needs, plus the cross-kind work queues:
/// the content reconciler re-enqueues the snapshot key directly rather than
/// waiting for the next watch event, so a status disagreement reconverges
/// quickly.
#[derive(Clone)]
pub struct Clients {
    pub client: Client,
    pub snapshots: Arc<dyn ApiOps<VolumeSnapshot>>,
    pub contents: Arc<dyn ApiOps<VolumeSnapshotContent>>,
    pub classes: Arc<dyn ApiOps<VolumeSnapshotClass>>,
    pub pvcs: Arc<dyn ApiOps<PersistentVolumeClaim>>,
    pub pvs: Arc<dyn ApiOps<PersistentVolume>>,
    pub groups: Arc<dyn ApiOps<GroupSnapshot>>,
    pub group_contents: Arc<dyn ApiOps<GroupSnapshotContent>>,
    pub group_classes: Arc<dyn ApiOps<GroupSnapshotClass>>,
    pub snapshot_queue: WorkQueue<String>,
    pub content_queue: WorkQueue<String>,
    pub group_queue: WorkQueue<String>,
    pub group_content_queue: WorkQueue<String>,
}
