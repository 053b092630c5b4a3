//! Small shared helpers: key derivation, finalizer list editing,
//! default-class selection, and the deletion-candidate predicate.

use crate::crd::{
    DeletionPolicy, VolumeSnapshot, VolumeSnapshotClass, VolumeSnapshotContent,
    FINALIZER_SNAPSHOT_BOUND,
};
use kube::ResourceExt;

/// Deterministic dynamic content name derived from a snapshot UID, so the
/// content can be located even before the snapshot's status is written.
pub fn dynamic_content_name(snapshot_uid: &str) -> String {
    format!("snapcontent-{snapshot_uid}")
}

/// Deterministic dynamic group-content name from a group-snapshot UID.
pub fn dynamic_group_content_name(group_snapshot_uid: &str) -> String {
    format!("groupsnapcontent-{group_snapshot_uid}")
}

/// (namespace, name) work-queue key.
pub fn namespaced_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

pub fn cluster_key(name: &str) -> String {
    name.to_string()
}

/// Returns the finalizer list with `finalizer` appended if not already
/// present (idempotent).
pub fn with_finalizer_added(existing: &[String], finalizer: &str) -> Vec<String> {
    if existing.iter().any(|f| f == finalizer) {
        return existing.to_vec();
    }
    let mut out = existing.to_vec();
    out.push(finalizer.to_string());
    out
}

/// Returns the finalizer list with `finalizer` removed (idempotent).
pub fn with_finalizer_removed(existing: &[String], finalizer: &str) -> Vec<String> {
    existing.iter().filter(|f| *f != finalizer).cloned().collect()
}

/// Selects the unique default `VolumeSnapshotClass` whose driver matches
/// `driver`. More than one default class for the same driver is an error.
pub fn select_default_class(
    classes: &[VolumeSnapshotClass],
    driver: &str,
) -> Result<Option<VolumeSnapshotClass>, String> {
    let mut matches: Vec<&VolumeSnapshotClass> = classes
        .iter()
        .filter(|c| c.is_default() && c.spec.driver == driver)
        .collect();
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches.remove(0).clone())),
        _ => Err(format!(
            "{} default volume snapshot classes found for driver {driver}, must be exactly one",
            matches.len()
        )),
    }
}

/// A snapshot is a deletion candidate if it has a DeletionTimestamp and
/// still carries at least one finalizer this controller manages.
pub fn is_deletion_candidate(snapshot: &VolumeSnapshot) -> bool {
    snapshot.metadata.deletion_timestamp.is_some() && !snapshot.finalizers().is_empty()
}

/// True if `snapshot` is a deletion candidate still holding the `Bound`
/// finalizer, i.e. it may be safe to mark its content as being-deleted.
/// Callers must additionally rule out an in-flight restore from this
/// snapshot before acting on this, since that check requires listing PVCs
/// and lives alongside the rest of the deletion protocol.
pub fn wants_content_deletion_annotation(snapshot: &VolumeSnapshot) -> bool {
    is_deletion_candidate(snapshot)
        && snapshot
            .finalizers()
            .iter()
            .any(|f| f == FINALIZER_SNAPSHOT_BOUND)
}

/// Resolves the deletion policy a content was created/bound under. Used
/// by the deletion protocol to decide whether to issue a content Delete
/// call.
pub fn content_deletion_policy(content: &VolumeSnapshotContent) -> DeletionPolicy {
    content.spec.deletion_policy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_content_name_is_deterministic() {
        assert_eq!(dynamic_content_name("abc-123"), "snapcontent-abc-123");
        assert_eq!(dynamic_content_name("abc-123"), dynamic_content_name("abc-123"));
    }

    #[test]
    fn finalizer_add_is_idempotent() {
        let empty: Vec<String> = vec![];
        let once = with_finalizer_added(&empty, "f1");
        assert_eq!(once, vec!["f1".to_string()]);
        let twice = with_finalizer_added(&once, "f1");
        assert_eq!(twice, vec!["f1".to_string()]);
    }

    #[test]
    fn finalizer_remove_is_idempotent() {
        let list = vec!["f1".to_string(), "f2".to_string()];
        let removed = with_finalizer_removed(&list, "f1");
        assert_eq!(removed, vec!["f2".to_string()]);
        let removed_again = with_finalizer_removed(&removed, "f1");
        assert_eq!(removed_again, vec!["f2".to_string()]);
    }

    #[test]
    fn select_default_class_errors_on_multiple_defaults() {
        use crate::crd::VolumeSnapshotClassSpec;
        use std::collections::BTreeMap;

        let make_class = |name: &str| {
            let mut c = VolumeSnapshotClass::new(
                name,
                VolumeSnapshotClassSpec {
                    driver: "hostpath.csi.k8s.io".to_string(),
                    deletion_policy: DeletionPolicy::Delete,
                    parameters: BTreeMap::new(),
                },
            );
            let mut annotations = BTreeMap::new();
            annotations.insert(
                crate::crd::ANN_IS_DEFAULT_CLASS.to_string(),
                "true".to_string(),
            );
            c.metadata.annotations = Some(annotations);
            c
        };

        let classes = vec![make_class("gold"), make_class("silver")];
        let result = select_default_class(&classes, "hostpath.csi.k8s.io");
        assert!(result.is_err());
    }

    #[test]
    fn select_default_class_ignores_other_drivers() {
        use crate::crd::VolumeSnapshotClassSpec;
        use std::collections::BTreeMap;

        let mut class = VolumeSnapshotClass::new(
            "gold",
            VolumeSnapshotClassSpec {
                driver: "other.csi.k8s.io".to_string(),
                deletion_policy: DeletionPolicy::Delete,
                parameters: BTreeMap::new(),
            },
        );
        let mut annotations = BTreeMap::new();
        annotations.insert(crate::crd::ANN_IS_DEFAULT_CLASS.to_string(), "true".to_string());
        class.metadata.annotations = Some(annotations);

        let result = select_default_class(&[class], "hostpath.csi.k8s.io").unwrap();
        assert!(result.is_none());
    }
}
