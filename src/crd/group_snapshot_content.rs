//! The `GroupSnapshotContent` CRD — grouped counterpart of
//! `VolumeSnapshotContent`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{DeletionPolicy, SnapshotError, VolumeSnapshotRef};

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "groupsnapshot.storage.k8s.io",
    version = "v1beta1",
    kind = "GroupSnapshotContent",
    status = "GroupSnapshotContentStatus",
    shortname = "vgsc"
)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshotContentSpec {
    pub volume_group_snapshot_ref: VolumeSnapshotRef,

    pub deletion_policy: DeletionPolicy,

    pub driver: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_class_name: Option<String>,

    #[serde(default)]
    pub source_volume_handles: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshotContentStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_handle: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,

    /// (volumeHandle, snapshotHandle) pairs the driver reported back for
    /// each member of the group.
    #[serde(default)]
    pub volume_snapshot_handle_pairs: Vec<VolumeSnapshotHandlePair>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
}

#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotHandlePair {
    pub volume_handle: String,
    pub snapshot_handle: String,
}

impl GroupSnapshotContent {
    pub fn is_being_deleted(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .map(|a| a.contains_key(super::common::ANN_BEING_DELETED))
            .unwrap_or(false)
    }

    pub fn being_deleted_patch() -> serde_json::Value {
        let mut annotations = serde_json::Map::new();
        annotations.insert(
            super::common::ANN_BEING_DELETED.to_string(),
            serde_json::Value::String("yes".to_string()),
        );
        serde_json::json!({ "metadata": { "annotations": annotations } })
    }
}
