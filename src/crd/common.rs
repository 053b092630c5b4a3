//! Types shared by several CRDs: object references, the `.status.error`
//! shape, and the finalizer string constants.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizers this controller adds to a Snapshot.
pub const FINALIZER_SNAPSHOT_AS_SOURCE: &str = "snapshot.storage.kubernetes.io/volumesnapshot-as-source-protection";
pub const FINALIZER_SNAPSHOT_BOUND: &str = "snapshot.storage.kubernetes.io/volumesnapshot-bound-protection";
pub const FINALIZER_SNAPSHOT_IN_GROUP: &str = "snapshot.storage.kubernetes.io/volumesnapshot-in-group-protection";

/// Finalizer this controller adds to a SnapshotContent.
pub const FINALIZER_CONTENT_PROTECTION: &str = "snapshot.storage.kubernetes.io/volumesnapshotcontent-bound-protection";

/// Finalizer this controller adds to the source PVC while an unready
/// snapshot still references it by name.
pub const FINALIZER_PVC_PROTECTION: &str = "snapshot.storage.kubernetes.io/pvc-as-volume-snapshot-source-protection";

/// Annotations this controller writes.
pub const ANN_DELETION_SECRET_NAME: &str = "snapshot.storage.kubernetes.io/deletion-secret-name";
pub const ANN_DELETION_SECRET_NAMESPACE: &str = "snapshot.storage.kubernetes.io/deletion-secret-namespace";
pub const ANN_BEING_DELETED: &str = "snapshot.storage.kubernetes.io/volumesnapshot-being-deleted";
pub const ANN_IS_DEFAULT_CLASS: &str = "snapshot.storage.kubernetes.io/is-default-class";

/// Label applied to dynamically created content when distributed
/// snapshotting is enabled.
pub const LABEL_MANAGED_BY_NODE: &str = "snapshot.storage.kubernetes.io/managed-by-node";

/// A back-reference from a SnapshotContent to the Snapshot that owns it.
///
/// `uid` is empty for a pre-provisioned content until the first bind; serde
/// skips it when empty so the written object doesn't carry a spurious empty
/// string through round-trips.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotRef {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
}

/// A reference to either a PVC (Snapshot's claim source) or a
/// SnapshotContent (Snapshot's content source) — exactly one of
/// `VolumeSnapshotSource`'s two fields is ever set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_content_name: Option<String>,
}

impl VolumeSnapshotSource {
    pub fn is_valid(&self) -> bool {
        self.persistent_volume_claim_name.is_some() ^ self.volume_snapshot_content_name.is_some()
    }

    pub fn is_pre_provisioned(&self) -> bool {
        self.volume_snapshot_content_name.is_some()
    }
}

/// A reference to either a driver volume handle (dynamic content source)
/// or a pre-existing driver snapshot handle (pre-provisioned content
/// source) — exactly one is ever set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_handle: Option<String>,
}

impl VolumeSnapshotContentSource {
    pub fn is_valid(&self) -> bool {
        self.volume_handle.is_some() ^ self.snapshot_handle.is_some()
    }

    /// Content "shape": dynamic content has a volume handle, pre-provisioned
    /// content has a snapshot handle.
    pub fn is_dynamic(&self) -> bool {
        self.volume_handle.is_some()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

/// `.status.error` shape shared by Snapshot and SnapshotContent.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
