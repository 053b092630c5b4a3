//! The `VolumeSnapshotClass` CRD — cluster-scoped policy object.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::DeletionPolicy;

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "snapshot.storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshotClass",
    shortname = "vsclass",
    printcolumn = r#"{"name":"Driver","type":"string","jsonPath":".driver"}"#,
    printcolumn = r#"{"name":"DeletionPolicy","type":"string","jsonPath":".deletionPolicy"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotClassSpec {
    pub driver: String,

    pub deletion_policy: DeletionPolicy,

    /// Opaque driver parameters; may contain secret-reference keys
    /// (`csi.storage.k8s.io/snapshotter-secret-name` /
    /// `csi.storage.k8s.io/snapshotter-secret-namespace`) which this
    /// controller resolves into annotations on the created content.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

pub const SECRET_NAME_PARAM: &str = "csi.storage.k8s.io/snapshotter-secret-name";
pub const SECRET_NAMESPACE_PARAM: &str = "csi.storage.k8s.io/snapshotter-secret-namespace";

impl VolumeSnapshotClass {
    pub fn is_default(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(super::common::ANN_IS_DEFAULT_CLASS))
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    /// Resolve the (name, namespace) secret reference from `parameters`, if
    /// the class declares one.
    pub fn deletion_secret_ref(&self) -> Option<(String, String)> {
        let name = self.spec.parameters.get(SECRET_NAME_PARAM)?;
        let namespace = self.spec.parameters.get(SECRET_NAMESPACE_PARAM)?;
        Some((name.clone(), namespace.clone()))
    }
}
