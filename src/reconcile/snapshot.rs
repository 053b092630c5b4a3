//! Snapshot Reconciler and its deletion protocol.

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::ListParams;
use kube::ResourceExt;

use crate::binding::{self, BindOutcome};
use crate::clients::Clients;
use crate::crd::{
    VolumeSnapshot, VolumeSnapshotClass, VolumeSnapshotContent, VolumeSnapshotContentSource,
    VolumeSnapshotContentSpec, VolumeSnapshotRef, ANN_DELETION_SECRET_NAME,
    ANN_DELETION_SECRET_NAMESPACE, FINALIZER_SNAPSHOT_AS_SOURCE, FINALIZER_SNAPSHOT_BOUND,
    FINALIZER_SNAPSHOT_IN_GROUP,
};
use crate::error::{Error, Result};
use crate::events::{publish, Reason};
use crate::finalizers;
use crate::metrics::{self, Operation, Outcome as MetricOutcome};
use crate::status;
use crate::util;

use super::{Outcome, ReconcileResult};

/// Entry point for one snapshot key.
pub async fn reconcile(clients: &Clients, namespace: &str, name: &str) -> ReconcileResult {
    let snapshot = match clients.snapshots.get(Some(namespace), name).await {
        Ok(s) => s,
        Err(Error::NotFound(_)) => return Ok(Outcome::Synced),
        Err(e) => return Err(e),
    };

    // Best-effort claim-finalizer check: errors are logged and reported via
    // event but never abort the rest of the sync.
    if let Some(claim_name) = snapshot.spec.source.persistent_volume_claim_name.clone() {
        if let Err(e) = reconcile_claim_finalizer(clients, namespace, &claim_name, &snapshot).await {
            tracing::warn!(error = %e, namespace, snapshot = name, "claim finalizer check failed");
            publish(&clients.client, &snapshot, Reason::ErrorPVCFinalizer, e.to_string()).await;
        }
    }

    if snapshot.metadata.deletion_timestamp.is_some() {
        return delete_snapshot(clients, snapshot).await;
    }

    if !snapshot.spec.source.is_valid() {
        let msg = "exactly one of spec.source.persistentVolumeClaimName or \
                   spec.source.volumeSnapshotContentName must be set";
        status::write_snapshot_error(&*clients.snapshots, &clients.client, &snapshot, msg, false).await?;
        publish(&clients.client, &snapshot, Reason::SnapshotValidationError, msg).await;
        return Err(Error::Validation(msg.to_string()));
    }

    // Class resolution only applies to a dynamic, standalone snapshot — a
    // pre-provisioned one already names its content, and a group member's
    // class comes from the group.
    let is_group_member = snapshot.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_IN_GROUP);
    let mut snapshot = snapshot;
    if snapshot.spec.volume_snapshot_class_name.is_none()
        && !snapshot.is_pre_provisioned()
        && !is_group_member
    {
        match resolve_class_for_claim(clients, namespace, &snapshot).await {
            Ok(Some(class_name)) => snapshot.spec.volume_snapshot_class_name = Some(class_name),
            Ok(None) => {}
            Err(e) => {
                status::write_snapshot_error(&*clients.snapshots, &clients.client, &snapshot, e.to_string(), false)
                    .await?;
                return Err(e);
            }
        }
    }

    maintain_finalizers(clients, namespace, &snapshot).await?;

    if !snapshot.is_ready() || snapshot.bound_content_name().is_none() {
        sync_unready(clients, namespace, &snapshot).await
    } else {
        sync_ready(clients, namespace, &snapshot).await
    }
}

async fn reconcile_claim_finalizer(
    clients: &Clients,
    namespace: &str,
    claim_name: &str,
    snapshot: &VolumeSnapshot,
) -> Result<()> {
    let claim = match clients.pvcs.get(Some(namespace), claim_name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    let this_still_needs_it = !snapshot.is_ready();
    let other_still_needs_it = finalizers::any_other_snapshot_needs_pvc(
        &*clients.snapshots,
        namespace,
        claim_name,
        &snapshot.name_any(),
    )
    .await?;
    // The PVC finalizer is present iff *some* unready snapshot — this one
    // included — still references the claim by name.
    if this_still_needs_it || other_still_needs_it {
        finalizers::protect_source_pvc(&*clients.pvcs, namespace, &claim).await?;
    } else {
        finalizers::unprotect_source_pvc(&*clients.pvcs, namespace, &claim).await?;
    }
    Ok(())
}

async fn resolve_class_for_claim(
    clients: &Clients,
    namespace: &str,
    snapshot: &VolumeSnapshot,
) -> Result<Option<String>> {
    let driver = match source_pv_driver(clients, namespace, snapshot).await? {
        Some(d) => d,
        None => return Ok(None),
    };
    let classes: Vec<VolumeSnapshotClass> = clients.classes.list(None, &ListParams::default()).await?;
    util::select_default_class(&classes, &driver)
        .map(|maybe| maybe.map(|c| c.name_any()))
        .map_err(Error::Validation)
}

/// Resolve the CSI driver of the PV backing `snapshot`'s source claim, if
/// the claim and its bound PV both already exist.
async fn source_pv_driver(
    clients: &Clients,
    namespace: &str,
    snapshot: &VolumeSnapshot,
) -> Result<Option<String>> {
    let claim_name = match &snapshot.spec.source.persistent_volume_claim_name {
        Some(n) => n,
        None => return Ok(None),
    };
    let claim = match clients.pvcs.get(Some(namespace), claim_name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    let pv_name = match claim.spec.as_ref().and_then(|s| s.volume_name.clone()) {
        Some(n) => n,
        None => return Ok(None),
    };
    let pv = match clients.pvs.get(None, &pv_name).await {
        Ok(p) => p,
        Err(Error::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    Ok(pv.spec.as_ref().and_then(|s| s.csi.as_ref()).map(|csi| csi.driver.clone()))
}

async fn maintain_finalizers(clients: &Clients, namespace: &str, snapshot: &VolumeSnapshot) -> Result<()> {
    finalizers::protect_as_source(&*clients.snapshots, namespace, snapshot).await?;
    if snapshot.bound_content_name().is_some() {
        finalizers::protect_bound(&*clients.snapshots, namespace, snapshot).await?;
    }
    Ok(())
}

async fn sync_unready(clients: &Clients, namespace: &str, snapshot: &VolumeSnapshot) -> ReconcileResult {
    if snapshot.is_pre_provisioned() {
        return sync_unready_pre_provisioned(clients, namespace, snapshot).await;
    }

    let is_group_member = snapshot.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_IN_GROUP);
    if is_group_member {
        if let Some(content_name) = snapshot.bound_content_name() {
            return sync_unready_group_member(clients, namespace, snapshot, content_name).await;
        }
        // Group hasn't created the content yet; nothing to do this pass.
        return Ok(Outcome::Synced);
    }

    let content_name = util::dynamic_content_name(&snapshot.uid().unwrap_or_default());
    match clients.contents.get(None, &content_name).await {
        Ok(content) => sync_unready_dynamic_found(clients, namespace, snapshot, &content, &content_name).await,
        Err(Error::NotFound(_)) => sync_unready_dynamic_absent(clients, namespace, snapshot, &content_name).await,
        Err(e) => Err(e),
    }
}

async fn sync_unready_pre_provisioned(
    clients: &Clients,
    namespace: &str,
    snapshot: &VolumeSnapshot,
) -> ReconcileResult {
    let content_name = snapshot
        .spec
        .source
        .volume_snapshot_content_name
        .clone()
        .expect("is_pre_provisioned implies contentName is set");

    let content = match clients.contents.get(None, &content_name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => {
            publish(
                &clients.client,
                snapshot,
                Reason::SnapshotContentMissing,
                format!("VolumeSnapshotContent {content_name} not found"),
            )
            .await;
            status::write_snapshot_error(
                &*clients.snapshots,
                &clients.client,
                snapshot,
                format!("VolumeSnapshotContent {content_name} is missing"),
                true,
            )
            .await?;
            return Ok(Outcome::Requeue);
        }
        Err(e) => return Err(e),
    };

    match binding::resolve_pre_provisioned(snapshot, &content) {
        BindOutcome::Bound => {}
        BindOutcome::Missing => unreachable!("Get already succeeded"),
        BindOutcome::Misbound(reason) => {
            publish(&clients.client, snapshot, Reason::SnapshotContentMisbound, reason.clone()).await;
            status::write_snapshot_error(&*clients.snapshots, &clients.client, snapshot, reason.clone(), true)
                .await?;
            return Err(Error::Misbound(reason));
        }
    }

    if content.spec.volume_snapshot_ref.uid.is_empty() {
        let patch = binding::bind_patch(snapshot, content.spec.volume_snapshot_class_name.as_deref());
        clients.contents.patch_merge(None, &content_name, &patch).await?;
    } else if content.spec.volume_snapshot_class_name.is_none() {
        if let Some(class) = &snapshot.spec.volume_snapshot_class_name {
            let patch = serde_json::json!({ "spec": { "volumeSnapshotClassName": class } });
            clients.contents.patch_merge(None, &content_name, &patch).await?;
        }
    }

    run_status_sync(clients, snapshot, &content, &content_name).await
}

async fn sync_unready_group_member(
    clients: &Clients,
    _namespace: &str,
    snapshot: &VolumeSnapshot,
    content_name: &str,
) -> ReconcileResult {
    let content = clients.contents.get(None, content_name).await?;
    run_status_sync(clients, snapshot, &content, content_name).await
}

async fn sync_unready_dynamic_found(
    clients: &Clients,
    _namespace: &str,
    snapshot: &VolumeSnapshot,
    content: &VolumeSnapshotContent,
    content_name: &str,
) -> ReconcileResult {
    if let BindOutcome::Misbound(reason) = binding::resolve_dynamic(snapshot, content) {
        publish(&clients.client, snapshot, Reason::SnapshotContentMismatch, reason.clone()).await;
        status::write_snapshot_error(&*clients.snapshots, &clients.client, snapshot, reason.clone(), true).await?;
        return Err(Error::Misbound(reason));
    }
    run_status_sync(clients, snapshot, content, content_name).await
}

async fn sync_unready_dynamic_absent(
    clients: &Clients,
    namespace: &str,
    snapshot: &VolumeSnapshot,
    content_name: &str,
) -> ReconcileResult {
    let claim_name = match &snapshot.spec.source.persistent_volume_claim_name {
        Some(n) => n.clone(),
        None => {
            let msg = "dynamic snapshot has no source claim to snapshot";
            status::write_snapshot_error(&*clients.snapshots, &clients.client, snapshot, msg, true).await?;
            return Err(Error::Validation(msg.to_string()));
        }
    };

    let claim: PersistentVolumeClaim = match clients.pvcs.get(Some(namespace), &claim_name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => {
            publish(
                &clients.client,
                snapshot,
                Reason::SnapshotPVCSourceMissing,
                format!("source claim {claim_name} not found"),
            )
            .await;
            return Ok(Outcome::Requeue);
        }
        Err(e) => return Err(e),
    };

    if claim.metadata.deletion_timestamp.is_some() {
        publish(
            &clients.client,
            snapshot,
            Reason::SnapshotPVCSourceMissing,
            format!("source claim {claim_name} is being deleted"),
        )
        .await;
        return Ok(Outcome::Requeue);
    }

    finalizers::protect_source_pvc(&*clients.pvcs, namespace, &claim).await?;

    let pv_name = claim
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.clone())
        .ok_or_else(|| Error::Validation(format!("claim {claim_name} is not yet bound to a volume")))?;
    let pv = clients.pvs.get(None, &pv_name).await?;
    let csi = pv
        .spec
        .as_ref()
        .and_then(|s| s.csi.as_ref())
        .ok_or_else(|| Error::Validation(format!("volume {pv_name} is not CSI-backed")))?;

    let class_name = snapshot.spec.volume_snapshot_class_name.clone();
    let class = match &class_name {
        Some(name) => Some(clients.classes.get(None, name).await?),
        None => None,
    };
    let deletion_policy = class
        .as_ref()
        .map(|c| c.spec.deletion_policy)
        .unwrap_or(crate::crd::DeletionPolicy::Delete);

    let mut metadata = k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
        name: Some(content_name.to_string()),
        ..Default::default()
    };
    if let Some(c) = &class {
        if let Some((secret_name, secret_namespace)) = c.deletion_secret_ref() {
            let mut annotations = std::collections::BTreeMap::new();
            annotations.insert(ANN_DELETION_SECRET_NAME.to_string(), secret_name);
            annotations.insert(ANN_DELETION_SECRET_NAMESPACE.to_string(), secret_namespace);
            metadata.annotations = Some(annotations);
        }
    }

    let content = VolumeSnapshotContent {
        metadata,
        spec: VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: snapshot.name_any(),
                namespace: namespace.to_string(),
                uid: snapshot.uid().unwrap_or_default(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: Some(csi.volume_handle.clone()),
                snapshot_handle: None,
            },
            deletion_policy,
            driver: csi.driver.clone(),
            volume_snapshot_class_name: class_name,
            source_volume_mode: pv
                .spec
                .as_ref()
                .and_then(|s| s.volume_mode.clone()),
        },
        status: None,
    };

    publish(&clients.client, snapshot, Reason::CreatingSnapshot, format!("Creating content {content_name}"))
        .await;
    let timer = metrics::OperationTimer::start(Operation::CreateSnapshot, content.spec.driver.clone());
    let created = match clients.contents.create(None, &content).await {
        Ok(c) => c,
        Err(e) => {
            timer.record(MetricOutcome::Error);
            publish(&clients.client, snapshot, Reason::CreateSnapshotContentFailed, e.to_string()).await;
            return Err(e);
        }
    };
    // The eventual ready/created edge is recorded by the status synchronizer
    // once the sidecar populates content.Status; this timer only tracks
    // that the create call itself succeeded or failed, so it is simply
    // dropped on the success path without recording a duration.
    drop(timer);

    let patch = serde_json::json!({ "status": { "boundVolumeSnapshotContentName": content_name } });
    clients
        .snapshots
        .patch_status_merge(Some(namespace), &snapshot.name_any(), &patch)
        .await?;

    run_status_sync(clients, snapshot, &created, content_name).await
}

async fn run_status_sync(
    clients: &Clients,
    snapshot: &VolumeSnapshot,
    content: &VolumeSnapshotContent,
    content_name: &str,
) -> ReconcileResult {
    #[cfg(feature = "group-snapshots")]
    let group_name = match status::resolve_group_name(content, &*clients.group_contents).await? {
        status::GroupNameResolution::NoGroup => None,
        status::GroupNameResolution::Resolved(name) => Some(name),
        // The content names a group handle but no group-content currently
        // reports it; writing status now would drop the group link, so
        // defer and pick this back up on the next pass instead.
        status::GroupNameResolution::Pending => return Ok(Outcome::Requeue),
    };
    #[cfg(not(feature = "group-snapshots"))]
    let group_name = None;

    status::sync_status(&*clients.snapshots, &clients.client, snapshot, content, content_name, group_name).await?;
    Ok(Outcome::Synced)
}

async fn sync_ready(clients: &Clients, _namespace: &str, snapshot: &VolumeSnapshot) -> ReconcileResult {
    let content_name = snapshot
        .bound_content_name()
        .expect("sync_ready only called when BoundContentName is set")
        .to_string();

    let content = match clients.contents.get(None, &content_name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => {
            let msg = format!("bound content {content_name} no longer exists");
            status::write_snapshot_error(&*clients.snapshots, &clients.client, snapshot, msg.clone(), true).await?;
            publish(&clients.client, snapshot, Reason::SnapshotContentMissing, msg).await;
            return Ok(Outcome::Requeue);
        }
        Err(e) => return Err(e),
    };

    if let Err(reason) = binding::verify_bound_integrity(snapshot, &content) {
        status::write_snapshot_error(&*clients.snapshots, &clients.client, snapshot, reason.clone(), true).await?;
        publish(&clients.client, snapshot, Reason::SnapshotContentMisbound, reason).await;
        return Ok(Outcome::Requeue);
    }

    Ok(Outcome::Synced)
}

/// Deletion protocol for a snapshot that has a DeletionTimestamp set.
async fn delete_snapshot(clients: &Clients, snapshot: VolumeSnapshot) -> ReconcileResult {
    let namespace = snapshot.namespace().unwrap_or_default();
    let timer = metrics::OperationTimer::start(Operation::DeleteSnapshot, "unknown");

    // Resolve the bound content, falling back to the deterministic dynamic
    // name when status hasn't been written yet.
    let content_name = snapshot
        .bound_content_name()
        .map(str::to_string)
        .unwrap_or_else(|| util::dynamic_content_name(&snapshot.uid().unwrap_or_default()));
    let mut content = clients.contents.get(None, &content_name).await.ok();

    // A content whose ref doesn't name this snapshot isn't actually ours.
    if let Some(c) = &content {
        if c.spec.volume_snapshot_ref.name != snapshot.name_any()
            || c.spec.volume_snapshot_ref.namespace != namespace
        {
            content = None;
        }
    }

    // Don't tear the snapshot down while a restore from it is in flight.
    if restore_in_flight(clients, &namespace, &snapshot).await? {
        publish(&clients.client, &snapshot, Reason::SnapshotDeletePending, "a restore from this snapshot is in flight")
            .await;
        timer.record(MetricOutcome::UnknownError);
        return Ok(Outcome::Requeue);
    }

    // A snapshot that's still a live group member can't be deleted on its
    // own; once the group itself is gone, let deletion proceed.
    let mut remove_in_group = false;
    if let Some(group_name) = snapshot.status.as_ref().and_then(|s| s.group_snapshot_name.clone()) {
        match clients.groups.get(Some(&namespace), &group_name).await {
            Ok(_) => {
                publish(
                    &clients.client,
                    &snapshot,
                    Reason::SnapshotFinalizerError,
                    format!("snapshot is still a member of group {group_name}"),
                )
                .await;
                timer.record(MetricOutcome::UnknownError);
                return Err(Error::GroupMembership(group_name));
            }
            Err(Error::NotFound(_)) => remove_in_group = true,
            Err(e) => return Err(e),
        }
    }

    // Mark the content being-deleted, and actually delete it when its
    // policy says so — the sidecar finishes the physical cleanup.
    let delete_content = if let Some(content) = &content {
        clients
            .contents
            .patch_merge(None, &content.name_any(), &VolumeSnapshotContent::being_deleted_patch())
            .await?;
        let policy = util::content_deletion_policy(content);
        if policy == crate::crd::DeletionPolicy::Delete {
            clients.contents.delete(None, &content.name_any()).await?;
            true
        } else {
            false
        }
    } else {
        false
    };

    // Release the source claim's finalizer before touching the
    // snapshot's own finalizer list.
    if let Some(claim_name) = &snapshot.spec.source.persistent_volume_claim_name {
        if let Ok(claim) = clients.pvcs.get(Some(&namespace), claim_name).await {
            let still_needed =
                finalizers::any_other_snapshot_needs_pvc(&*clients.snapshots, &namespace, claim_name, &snapshot.name_any())
                    .await?;
            if !still_needed {
                finalizers::unprotect_source_pvc(&*clients.pvcs, &namespace, &claim).await?;
            }
        }
    }

    let mut remaining = util::with_finalizer_removed(snapshot.finalizers(), FINALIZER_SNAPSHOT_AS_SOURCE);
    if !(content.is_some() && delete_content) {
        remaining = util::with_finalizer_removed(&remaining, FINALIZER_SNAPSHOT_BOUND);
    }
    if remove_in_group {
        remaining = util::with_finalizer_removed(&remaining, FINALIZER_SNAPSHOT_IN_GROUP);
    }

    let patch = if remaining.is_empty() {
        serde_json::json!({ "metadata": { "finalizers": null } })
    } else {
        serde_json::json!({ "metadata": { "finalizers": remaining } })
    };
    clients
        .snapshots
        .patch_merge(Some(&namespace), &snapshot.name_any(), &patch)
        .await?;

    timer.record(MetricOutcome::Success);
    metrics::record_reconcile("VolumeSnapshot", "deleted");
    Ok(Outcome::Synced)
}

/// True if a PVC in `namespace` has a DataSource pointing to `snapshot` and
/// is still `Pending`, meaning a restore from this snapshot is under way
/// and it must not be torn down yet. Shared with the content reconciler,
/// which withholds the being-deleted annotation under the same condition.
pub(crate) async fn restore_in_flight(
    clients: &Clients,
    namespace: &str,
    snapshot: &VolumeSnapshot,
) -> Result<bool> {
    let claims: Vec<PersistentVolumeClaim> = clients.pvcs.list(Some(namespace), &ListParams::default()).await?;
    Ok(claims.iter().any(|pvc| {
        let source = match pvc.spec.as_ref().and_then(|s| s.data_source.as_ref()) {
            Some(d) => d,
            None => return false,
        };
        let is_snapshot_ref = source.kind == "VolumeSnapshot"
            && source.name == snapshot.name_any()
            && source.api_group.as_deref() == Some("snapshot.storage.k8s.io");
        let pending = pvc
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Pending");
        is_snapshot_ref && pending
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_ops::MockApiOps;
    use crate::crd::{VolumeSnapshotSource, VolumeSnapshotSpec};
    use std::sync::Arc;

    struct Harness {
        clients: Clients,
        snapshots: Arc<MockApiOps<VolumeSnapshot>>,
        contents: Arc<MockApiOps<VolumeSnapshotContent>>,
    }

    fn harness() -> Harness {
        let snapshots = Arc::new(MockApiOps::new());
        let contents = Arc::new(MockApiOps::new());
        let clients = Clients {
            client: crate::status::test_support::fake_client(),
            snapshots: snapshots.clone(),
            contents: contents.clone(),
            classes: Arc::new(MockApiOps::new()),
            pvcs: Arc::new(MockApiOps::new()),
            pvs: Arc::new(MockApiOps::new()),
            groups: Arc::new(MockApiOps::new()),
            group_contents: Arc::new(MockApiOps::new()),
            group_classes: Arc::new(MockApiOps::new()),
            snapshot_queue: crate::queue::WorkQueue::new(),
            content_queue: crate::queue::WorkQueue::new(),
            group_queue: crate::queue::WorkQueue::new(),
            group_content_queue: crate::queue::WorkQueue::new(),
        };
        Harness { clients, snapshots, contents }
    }

    fn snapshot(name: &str) -> VolumeSnapshot {
        let mut s = VolumeSnapshot::new(
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
        s.metadata.uid = Some("uid-1".to_string());
        s
    }

    #[tokio::test]
    async fn missing_snapshot_is_treated_as_already_synced() {
        let h = harness();
        let outcome = reconcile(&h.clients, "ns1", "ghost").await.unwrap();
        assert!(matches!(outcome, Outcome::Synced));
    }

    #[tokio::test]
    async fn invalid_source_produces_validation_error() {
        let h = harness();
        let mut s = snapshot("s1");
        s.spec.source.volume_snapshot_content_name = Some("c1".to_string());
        h.snapshots.seed("ns1/s1", s);
        let result = reconcile(&h.clients, "ns1", "s1").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn pre_provisioned_missing_content_requeues() {
        let h = harness();
        let mut s = snapshot("s1");
        s.spec.source.persistent_volume_claim_name = None;
        s.spec.source.volume_snapshot_content_name = Some("preexisting".to_string());
        h.snapshots.seed("ns1/s1", s);
        let outcome = reconcile(&h.clients, "ns1", "s1").await.unwrap();
        assert!(matches!(outcome, Outcome::Requeue));
    }

    #[tokio::test]
    async fn ready_snapshot_with_intact_binding_does_not_requeue() {
        use crate::crd::{
            DeletionPolicy, VolumeSnapshotContentSource, VolumeSnapshotContentSpec,
            VolumeSnapshotRef, VolumeSnapshotStatus,
        };

        let h = harness();
        let mut s = snapshot("s1");
        s.metadata.finalizers = Some(vec![
            crate::crd::FINALIZER_SNAPSHOT_AS_SOURCE.to_string(),
            crate::crd::FINALIZER_SNAPSHOT_BOUND.to_string(),
        ]);
        s.status = Some(VolumeSnapshotStatus {
            bound_volume_snapshot_content_name: Some("snapcontent-uid-1".to_string()),
            creation_time: None,
            ready_to_use: Some(true),
            restore_size: None,
            error: None,
            group_snapshot_name: None,
        });
        h.snapshots.seed("ns1/s1", s);

        let content = VolumeSnapshotContent::new(
            "snapcontent-uid-1",
            VolumeSnapshotContentSpec {
                volume_snapshot_ref: VolumeSnapshotRef {
                    name: "s1".to_string(),
                    namespace: "ns1".to_string(),
                    uid: "uid-1".to_string(),
                },
                source: VolumeSnapshotContentSource {
                    volume_handle: Some("vol-1".to_string()),
                    snapshot_handle: None,
                },
                deletion_policy: DeletionPolicy::Delete,
                driver: "hostpath.csi.k8s.io".to_string(),
                volume_snapshot_class_name: None,
                source_volume_mode: None,
            },
        );
        h.contents.seed("snapcontent-uid-1", content);

        let outcome = reconcile(&h.clients, "ns1", "s1").await.unwrap();
        assert!(matches!(outcome, Outcome::Synced));
    }
}
