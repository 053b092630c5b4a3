//! The `GroupSnapshotClass` CRD — grouped counterpart of
//! `VolumeSnapshotClass`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::DeletionPolicy;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "groupsnapshot.storage.k8s.io",
    version = "v1beta1",
    kind = "GroupSnapshotClass",
    shortname = "vgsclass"
)]
#[serde(rename_all = "camelCase")]
pub struct GroupSnapshotClassSpec {
    pub driver: String,
    pub deletion_policy: DeletionPolicy,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl GroupSnapshotClass {
    pub fn is_default(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(super::common::ANN_IS_DEFAULT_CLASS))
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}
