use super::*;

#[test]
fn snapshot_source_exclusivity() {
    let mut source = VolumeSnapshotSource {
        persistent_volume_claim_name: Some("pvc-a".to_string()),
        volume_snapshot_content_name: None,
    };
    assert!(source.is_valid());
    assert!(!source.is_pre_provisioned());

    source.volume_snapshot_content_name = Some("content-a".to_string());
    assert!(!source.is_valid(), "both fields set must violate I2");

    source.persistent_volume_claim_name = None;
    assert!(source.is_valid());
    assert!(source.is_pre_provisioned());

    let empty = VolumeSnapshotSource::default();
    assert!(!empty.is_valid(), "neither field set must violate I2");
}

#[test]
fn content_source_shape() {
    let dynamic = VolumeSnapshotContentSource {
        volume_handle: Some("vol-123".to_string()),
        snapshot_handle: None,
    };
    assert!(dynamic.is_valid());
    assert!(dynamic.is_dynamic());

    let pre_provisioned = VolumeSnapshotContentSource {
        volume_handle: None,
        snapshot_handle: Some("snap-123".to_string()),
    };
    assert!(pre_provisioned.is_valid());
    assert!(!pre_provisioned.is_dynamic());
}

#[test]
fn class_default_annotation() {
    let mut class = VolumeSnapshotClass::new(
        "gold",
        VolumeSnapshotClassSpec {
            driver: "hostpath.csi.k8s.io".to_string(),
            deletion_policy: DeletionPolicy::Delete,
            parameters: Default::default(),
        },
    );
    assert!(!class.is_default());

    let mut annotations = std::collections::BTreeMap::new();
    annotations.insert(ANN_IS_DEFAULT_CLASS.to_string(), "true".to_string());
    class.metadata.annotations = Some(annotations);
    assert!(class.is_default());
}

#[test]
fn class_deletion_secret_resolution() {
    let mut parameters = std::collections::BTreeMap::new();
    parameters.insert(
        super::volume_snapshot_class::SECRET_NAME_PARAM.to_string(),
        "snap-secret".to_string(),
    );
    parameters.insert(
        super::volume_snapshot_class::SECRET_NAMESPACE_PARAM.to_string(),
        "kube-system".to_string(),
    );
    let class = VolumeSnapshotClass::new(
        "gold",
        VolumeSnapshotClassSpec {
            driver: "hostpath.csi.k8s.io".to_string(),
            deletion_policy: DeletionPolicy::Delete,
            parameters,
        },
    );
    assert_eq!(
        class.deletion_secret_ref(),
        Some(("snap-secret".to_string(), "kube-system".to_string()))
    );
}
