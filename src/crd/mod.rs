//! Custom Resource Definitions for the volume snapshot subsystem.
//!
//! Four core CRDs (Snapshot, SnapshotContent, SnapshotClass — the source
//! claim is just `k8s_openapi`'s `PersistentVolumeClaim`) plus three
//! optional group CRDs behind the `group-snapshots` feature.

mod common;
mod group_snapshot;
mod group_snapshot_class;
mod group_snapshot_content;
mod volume_snapshot;
mod volume_snapshot_class;
mod volume_snapshot_content;

pub use common::*;
pub use group_snapshot::{GroupSnapshot, GroupSnapshotSource, GroupSnapshotSpec, GroupSnapshotStatus};
pub use group_snapshot_class::{GroupSnapshotClass, GroupSnapshotClassSpec};
pub use group_snapshot_content::{
    GroupSnapshotContent, GroupSnapshotContentSpec, GroupSnapshotContentStatus,
};
pub use volume_snapshot::{VolumeSnapshot, VolumeSnapshotSpec, VolumeSnapshotStatus};
pub use volume_snapshot_class::{VolumeSnapshotClass, VolumeSnapshotClassSpec};
pub use volume_snapshot_content::{
    VolumeSnapshotContent, VolumeSnapshotContentSpec, VolumeSnapshotContentStatus,
};

#[cfg(test)]
mod tests;
