//! Finalizer Manager.
//!
//! Adds and removes the controller's own finalizers on Snapshots, Contents,
//! and source PVCs. Every mutation here goes through `ApiOps::patch_merge`
//! so it is exercised the same way in tests (via `MockApiOps`) as it is in
//! production.

use std::fmt::Debug;

use kube::api::ListParams;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api_ops::ApiOps;
use crate::crd::{
    FINALIZER_CONTENT_PROTECTION, FINALIZER_PVC_PROTECTION, FINALIZER_SNAPSHOT_AS_SOURCE,
    FINALIZER_SNAPSHOT_BOUND, FINALIZER_SNAPSHOT_IN_GROUP,
};
use crate::error::Result;
use crate::util::{with_finalizer_added, with_finalizer_removed};

/// Build the patch body for a finalizer-list change.
///
/// An empty target list cannot be expressed as a JSON merge-patch (merging
/// `[]` leaves the existing array untouched under RFC 7386 semantics), so
/// that case is expressed as `null`, which merge-patch interprets as
/// "delete the field" — `metadata.finalizers` then reads back as absent,
/// which `Vec<String>`'s `#[serde(default)]` on the generated type decodes
/// as empty.
fn finalizer_patch(new_list: &[String]) -> serde_json::Value {
    if new_list.is_empty() {
        serde_json::json!({ "metadata": { "finalizers": null } })
    } else {
        serde_json::json!({ "metadata": { "finalizers": new_list } })
    }
}

/// Ensure `finalizer` is present on `object`, patching only if missing.
pub async fn ensure_finalizer<K, A>(
    api: &A,
    namespace: Option<&str>,
    object: &K,
    finalizer: &str,
) -> Result<K>
where
    K: Resource<DynamicType = ()> + ResourceExt + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    A: ApiOps<K>,
{
    let existing = object.finalizers();
    if existing.iter().any(|f| f == finalizer) {
        return Ok(object.clone());
    }
    let updated = with_finalizer_added(existing, finalizer);
    let patch = finalizer_patch(&updated);
    api.patch_merge(namespace, &object.name_any(), &patch).await
}

/// Remove `finalizer` from `object`, patching only if present.
pub async fn release_finalizer<K, A>(
    api: &A,
    namespace: Option<&str>,
    object: &K,
    finalizer: &str,
) -> Result<K>
where
    K: Resource<DynamicType = ()> + ResourceExt + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
    A: ApiOps<K>,
{
    let existing = object.finalizers();
    if !existing.iter().any(|f| f == finalizer) {
        return Ok(object.clone());
    }
    let updated = with_finalizer_removed(existing, finalizer);
    let patch = finalizer_patch(&updated);
    api.patch_merge(namespace, &object.name_any(), &patch).await
}

/// Add the `AsSource` finalizer to a Snapshot used as a restore source.
/// Idempotent.
pub async fn protect_as_source<A>(
    api: &A,
    namespace: &str,
    snapshot: &crate::crd::VolumeSnapshot,
) -> Result<crate::crd::VolumeSnapshot>
where
    A: ApiOps<crate::crd::VolumeSnapshot>,
{
    ensure_finalizer(api, Some(namespace), snapshot, FINALIZER_SNAPSHOT_AS_SOURCE).await
}

/// Add the `Bound` finalizer once a Snapshot is bound to content.
/// Idempotent.
pub async fn protect_bound<A>(
    api: &A,
    namespace: &str,
    snapshot: &crate::crd::VolumeSnapshot,
) -> Result<crate::crd::VolumeSnapshot>
where
    A: ApiOps<crate::crd::VolumeSnapshot>,
{
    ensure_finalizer(api, Some(namespace), snapshot, FINALIZER_SNAPSHOT_BOUND).await
}

/// Add the `InGroup` finalizer while a Snapshot is a live member of a
/// VolumeGroupSnapshot. Idempotent.
pub async fn protect_in_group<A>(
    api: &A,
    namespace: &str,
    snapshot: &crate::crd::VolumeSnapshot,
) -> Result<crate::crd::VolumeSnapshot>
where
    A: ApiOps<crate::crd::VolumeSnapshot>,
{
    ensure_finalizer(api, Some(namespace), snapshot, FINALIZER_SNAPSHOT_IN_GROUP).await
}

/// Add the content-protection finalizer to a bound SnapshotContent.
/// Idempotent.
pub async fn protect_content<A>(
    api: &A,
    content: &crate::crd::VolumeSnapshotContent,
) -> Result<crate::crd::VolumeSnapshotContent>
where
    A: ApiOps<crate::crd::VolumeSnapshotContent>,
{
    ensure_finalizer(api, None, content, FINALIZER_CONTENT_PROTECTION).await
}

/// Remove the content-protection finalizer once the content is safe to
/// garbage-collect.
pub async fn unprotect_content<A>(
    api: &A,
    content: &crate::crd::VolumeSnapshotContent,
) -> Result<crate::crd::VolumeSnapshotContent>
where
    A: ApiOps<crate::crd::VolumeSnapshotContent>,
{
    release_finalizer(api, None, content, FINALIZER_CONTENT_PROTECTION).await
}

/// Add the PVC-as-source finalizer while an unready Snapshot still
/// references a claim by name. `pvc` is a
/// `k8s_openapi::api::core::v1::PersistentVolumeClaim`.
pub async fn protect_source_pvc<A>(
    api: &A,
    namespace: &str,
    pvc: &k8s_openapi::api::core::v1::PersistentVolumeClaim,
) -> Result<k8s_openapi::api::core::v1::PersistentVolumeClaim>
where
    A: ApiOps<k8s_openapi::api::core::v1::PersistentVolumeClaim>,
{
    ensure_finalizer(api, Some(namespace), pvc, FINALIZER_PVC_PROTECTION).await
}

pub async fn unprotect_source_pvc<A>(
    api: &A,
    namespace: &str,
    pvc: &k8s_openapi::api::core::v1::PersistentVolumeClaim,
) -> Result<k8s_openapi::api::core::v1::PersistentVolumeClaim>
where
    A: ApiOps<k8s_openapi::api::core::v1::PersistentVolumeClaim>,
{
    release_finalizer(api, Some(namespace), pvc, FINALIZER_PVC_PROTECTION).await
}

/// True if any other unready Snapshot in the namespace still references
/// `pvc_name` as its source — the PVC finalizer is only released once no
/// unready Snapshot needs it any more. `list_params` restricts to the
/// namespace already, since `VolumeSnapshot` is namespace-scoped.
pub async fn any_other_snapshot_needs_pvc<A>(
    api: &A,
    namespace: &str,
    pvc_name: &str,
    excluding_snapshot: &str,
) -> Result<bool>
where
    A: ApiOps<crate::crd::VolumeSnapshot>,
{
    let snapshots = api.list(Some(namespace), &ListParams::default()).await?;
    Ok(snapshots.iter().any(|s| {
        s.name_any() != excluding_snapshot
            && !s.is_ready()
            && s.spec.source.persistent_volume_claim_name.as_deref() == Some(pvc_name)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_ops::MockApiOps;
    use crate::crd::{VolumeSnapshotSource, VolumeSnapshotSpec};

    fn snapshot(name: &str) -> crate::crd::VolumeSnapshot {
        let mut s = crate::crd::VolumeSnapshot::new(
            name,
            VolumeSnapshotSpec {
                source: VolumeSnapshotSource {
                    persistent_volume_claim_name: Some("pvc-a".to_string()),
                    volume_snapshot_content_name: None,
                },
                volume_snapshot_class_name: None,
            },
        );
        s.metadata.namespace = Some("ns1".to_string());
        s
    }

    #[tokio::test]
    async fn ensure_finalizer_adds_once() {
        let mock: MockApiOps<crate::crd::VolumeSnapshot> = MockApiOps::new();
        let s = snapshot("s1");
        mock.seed("ns1/s1", s.clone());
        let patched = protect_bound(&mock, "ns1", &s).await.unwrap();
        assert!(patched.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_BOUND));
    }

    #[tokio::test]
    async fn ensure_finalizer_is_idempotent_on_second_call() {
        let mock: MockApiOps<crate::crd::VolumeSnapshot> = MockApiOps::new();
        let mut s = snapshot("s1");
        s.metadata.finalizers = Some(vec![FINALIZER_SNAPSHOT_BOUND.to_string()]);
        mock.seed("ns1/s1", s.clone());
        let patched = protect_bound(&mock, "ns1", &s).await.unwrap();
        assert_eq!(patched.finalizers().len(), 1);
    }

    #[tokio::test]
    async fn release_finalizer_clears_empty_list_via_null_patch() {
        let mock: MockApiOps<crate::crd::VolumeSnapshot> = MockApiOps::new();
        let mut s = snapshot("s1");
        s.metadata.finalizers = Some(vec![FINALIZER_SNAPSHOT_BOUND.to_string()]);
        mock.seed("ns1/s1", s.clone());
        let patched = release_finalizer(&mock, Some("ns1"), &s, FINALIZER_SNAPSHOT_BOUND)
            .await
            .unwrap();
        assert!(patched.finalizers().is_empty());
    }

    #[tokio::test]
    async fn any_other_snapshot_needs_pvc_excludes_self_and_ready() {
        let mock: MockApiOps<crate::crd::VolumeSnapshot> = MockApiOps::new();
        let other = snapshot("other");
        mock.seed("ns1/other", other);
        let self_snap = snapshot("s1");
        mock.seed("ns1/s1", self_snap);
        let needed = any_other_snapshot_needs_pvc(&mock, "ns1", "pvc-a", "s1")
            .await
            .unwrap();
        assert!(needed);

        let needed_excluding_self = any_other_snapshot_needs_pvc(&mock, "ns1", "pvc-a", "other")
            .await
            .unwrap();
        assert!(!needed_excluding_self);
    }
}
