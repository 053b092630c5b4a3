//! End-to-end reconciler scenarios, driven against the in-memory
//! `MockApiOps` rather than a live API server.

use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    CSIPersistentVolumeSource, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimStatus, PersistentVolumeSpec, TypedLocalObjectReference,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;

use snapshot_controller::api_ops::MockApiOps;
use snapshot_controller::clients::Clients;
use snapshot_controller::crd::{
    DeletionPolicy, VolumeSnapshot, VolumeSnapshotClass, VolumeSnapshotClassSpec,
    VolumeSnapshotContent, VolumeSnapshotContentSource, VolumeSnapshotContentSpec,
    VolumeSnapshotContentStatus, VolumeSnapshotRef, VolumeSnapshotSource, VolumeSnapshotSpec,
    VolumeSnapshotStatus, FINALIZER_SNAPSHOT_AS_SOURCE, FINALIZER_SNAPSHOT_BOUND,
    FINALIZER_PVC_PROTECTION,
};
use snapshot_controller::queue::WorkQueue;
use snapshot_controller::reconcile::{content as content_reconciler, snapshot as snapshot_reconciler};

fn fake_client() -> kube::Client {
    kube::Client::try_from(kube::Config::new("https://127.0.0.1:1".parse().unwrap())).unwrap()
}

fn harness() -> (
    Clients,
    Arc<MockApiOps<VolumeSnapshot>>,
    Arc<MockApiOps<VolumeSnapshotContent>>,
    Arc<MockApiOps<PersistentVolumeClaim>>,
    Arc<MockApiOps<PersistentVolume>>,
) {
    let snapshots = Arc::new(MockApiOps::new());
    let contents = Arc::new(MockApiOps::new());
    let pvcs = Arc::new(MockApiOps::new());
    let pvs = Arc::new(MockApiOps::new());
    let clients = Clients {
        client: fake_client(),
        snapshots: snapshots.clone(),
        contents: contents.clone(),
        classes: Arc::new(MockApiOps::new()),
        pvcs: pvcs.clone(),
        pvs: pvs.clone(),
        groups: Arc::new(MockApiOps::new()),
        group_contents: Arc::new(MockApiOps::new()),
        group_classes: Arc::new(MockApiOps::new()),
        snapshot_queue: WorkQueue::new(),
        content_queue: WorkQueue::new(),
        group_queue: WorkQueue::new(),
        group_content_queue: WorkQueue::new(),
    };
    (clients, snapshots, contents, pvcs, pvs)
}

fn bound_claim(name: &str, pv_name: &str) -> PersistentVolumeClaim {
    let mut claim = PersistentVolumeClaim {
        metadata: Default::default(),
        spec: Some(PersistentVolumeClaimSpec {
            volume_name: Some(pv_name.to_string()),
            ..Default::default()
        }),
        status: Some(PersistentVolumeClaimStatus {
            phase: Some("Bound".to_string()),
            ..Default::default()
        }),
    };
    claim.metadata.name = Some(name.to_string());
    claim.metadata.namespace = Some("ns1".to_string());
    claim
}

fn csi_pv(name: &str, driver: &str, handle: &str) -> PersistentVolume {
    let mut pv = PersistentVolume {
        metadata: Default::default(),
        spec: Some(PersistentVolumeSpec {
            csi: Some(CSIPersistentVolumeSource {
                driver: driver.to_string(),
                volume_handle: handle.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        status: None,
    };
    pv.metadata.name = Some(name.to_string());
    pv
}

fn dynamic_snapshot(name: &str, uid: &str, claim_name: &str, class: Option<&str>) -> VolumeSnapshot {
    let mut s = VolumeSnapshot::new(
        name,
        VolumeSnapshotSpec {
            source: VolumeSnapshotSource {
                persistent_volume_claim_name: Some(claim_name.to_string()),
                volume_snapshot_content_name: None,
            },
            volume_snapshot_class_name: class.map(str::to_string),
        },
    );
    s.metadata.namespace = Some("ns1".to_string());
    s.metadata.uid = Some(uid.to_string());
    s
}

/// Dynamic creation succeeds: content is created, status converges to ready.
#[tokio::test]
async fn dynamic_creation_and_ready_transition() {
    let (clients, snapshots, contents, pvcs, pvs) = harness();

    pvcs.seed("ns1/pvc-a", bound_claim("pvc-a", "pv-a"));
    pvs.seed("pv-a", csi_pv("pv-a", "hostpath.csi.k8s.io", "handle-a"));
    let class = VolumeSnapshotClass::new(
        "gold",
        VolumeSnapshotClassSpec {
            driver: "hostpath.csi.k8s.io".to_string(),
            deletion_policy: DeletionPolicy::Delete,
            parameters: Default::default(),
        },
    );
    clients.classes.create(None, &class).await.unwrap();
    let snap = dynamic_snapshot("s1", "uid-1", "pvc-a", Some("gold"));
    snapshots.seed("ns1/s1", snap);

    let outcome = snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    assert!(matches!(outcome, snapshot_controller::reconcile::Outcome::Synced));

    let content = contents.get(None, "snapcontent-uid-1").await.unwrap();
    assert_eq!(content.spec.source.volume_handle.as_deref(), Some("handle-a"));
    assert_eq!(content.spec.volume_snapshot_ref.uid, "uid-1");

    let synced = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert_eq!(synced.bound_content_name(), Some("snapcontent-uid-1"));
    assert!(!synced.is_ready());
    assert!(synced.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_AS_SOURCE));

    let claim = pvcs.get(Some("ns1"), "pvc-a").await.unwrap();
    assert!(claim.finalizers().iter().any(|f| f == FINALIZER_PVC_PROTECTION));

    // A second pass now sees BoundContentName set and adds the Bound
    // finalizer (finalizer maintenance runs against the freshly-fetched
    // snapshot at the top of each reconcile).
    snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    let synced = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert!(synced.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_BOUND));

    // Simulated sidecar flips the content to ready.
    let mut ready_content = contents.get(None, "snapcontent-uid-1").await.unwrap();
    ready_content.status = Some(VolumeSnapshotContentStatus {
        ready_to_use: Some(true),
        creation_time: Some(1_700_000_000_000_000_000),
        ..Default::default()
    });
    contents.seed("snapcontent-uid-1", ready_content);

    snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    let synced = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert!(synced.is_ready());
    assert!(synced.status.as_ref().unwrap().creation_time.is_some());
}

/// Pre-provisioned bind: the named content's ref.uid is patched in.
#[tokio::test]
async fn pre_provisioned_bind_sets_ref_uid() {
    let (clients, snapshots, contents, _pvcs, _pvs) = harness();

    let content = VolumeSnapshotContent::new(
        "c1",
        VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: "s1".to_string(),
                namespace: "ns1".to_string(),
                uid: String::new(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: None,
                snapshot_handle: Some("h1".to_string()),
            },
            deletion_policy: DeletionPolicy::Retain,
            driver: "hostpath.csi.k8s.io".to_string(),
            volume_snapshot_class_name: None,
            source_volume_mode: None,
        },
    );
    contents.seed("c1", content);

    let mut s1 = VolumeSnapshot::new(
        "s1",
        VolumeSnapshotSpec {
            source: VolumeSnapshotSource {
                persistent_volume_claim_name: None,
                volume_snapshot_content_name: Some("c1".to_string()),
            },
            volume_snapshot_class_name: None,
        },
    );
    s1.metadata.namespace = Some("ns1".to_string());
    s1.metadata.uid = Some("snap-uid".to_string());
    snapshots.seed("ns1/s1", s1);

    snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();

    let content_after = contents.get(None, "c1").await.unwrap();
    assert_eq!(content_after.spec.volume_snapshot_ref.uid, "snap-uid");

    let snap_after = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert_eq!(snap_after.bound_content_name(), Some("c1"));
}

/// A content bound to a different snapshot is rejected with an error status.
#[tokio::test]
async fn misbound_content_produces_error_status() {
    let (clients, snapshots, contents, _pvcs, _pvs) = harness();

    let content = VolumeSnapshotContent::new(
        "c2",
        VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: "other".to_string(),
                namespace: "ns1".to_string(),
                uid: String::new(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: None,
                snapshot_handle: Some("h2".to_string()),
            },
            deletion_policy: DeletionPolicy::Retain,
            driver: "hostpath.csi.k8s.io".to_string(),
            volume_snapshot_class_name: None,
            source_volume_mode: None,
        },
    );
    contents.seed("c2", content.clone());

    let mut s2 = VolumeSnapshot::new(
        "s2",
        VolumeSnapshotSpec {
            source: VolumeSnapshotSource {
                persistent_volume_claim_name: None,
                volume_snapshot_content_name: Some("c2".to_string()),
            },
            volume_snapshot_class_name: None,
        },
    );
    s2.metadata.namespace = Some("ns1".to_string());
    s2.metadata.uid = Some("s2-uid".to_string());
    snapshots.seed("ns1/s2", s2);

    let result = snapshot_reconciler::reconcile(&clients, "ns1", "s2").await;
    assert!(result.is_err());

    let snap_after = snapshots.get(Some("ns1"), "s2").await.unwrap();
    let msg = snap_after
        .status
        .as_ref()
        .and_then(|s| s.error.as_ref())
        .and_then(|e| e.message.as_ref())
        .expect("error status should be set");
    assert!(msg.contains("different snapshot"), "message was: {msg}");

    // Content is untouched.
    let content_after = contents.get(None, "c2").await.unwrap();
    assert_eq!(content_after.spec.volume_snapshot_ref, content.spec.volume_snapshot_ref);
}

fn bound_pair(policy: DeletionPolicy) -> (VolumeSnapshot, VolumeSnapshotContent) {
    let mut snap = VolumeSnapshot::new(
        "s1",
        VolumeSnapshotSpec {
            source: VolumeSnapshotSource {
                persistent_volume_claim_name: Some("pvc-a".to_string()),
                volume_snapshot_content_name: None,
            },
            volume_snapshot_class_name: None,
        },
    );
    snap.metadata.namespace = Some("ns1".to_string());
    snap.metadata.uid = Some("uid-1".to_string());
    snap.metadata.finalizers = Some(vec![
        FINALIZER_SNAPSHOT_AS_SOURCE.to_string(),
        FINALIZER_SNAPSHOT_BOUND.to_string(),
    ]);
    snap.metadata.deletion_timestamp = Some(Time(chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap()));
    snap.status = Some(VolumeSnapshotStatus {
        bound_volume_snapshot_content_name: Some("snapcontent-uid-1".to_string()),
        creation_time: None,
        ready_to_use: Some(true),
        restore_size: None,
        error: None,
        group_snapshot_name: None,
    });

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
            deletion_policy: policy,
            driver: "hostpath.csi.k8s.io".to_string(),
            volume_snapshot_class_name: None,
            source_volume_mode: None,
        },
    );
    (snap, content)
}

/// Deleting a snapshot under a Retain content keeps the content and drops
/// the Bound finalizer.
#[tokio::test]
async fn deletion_retain_keeps_content_drops_bound_finalizer() {
    let (clients, snapshots, contents, _pvcs, _pvs) = harness();
    let (snap, content) = bound_pair(DeletionPolicy::Retain);
    snapshots.seed("ns1/s1", snap);
    contents.seed("snapcontent-uid-1", content);

    snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();

    // Content still exists and was never API-deleted.
    let content_after = contents.get(None, "snapcontent-uid-1").await.unwrap();
    assert!(content_after.is_being_deleted());

    let snap_after = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert!(!snap_after.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_BOUND));
    assert!(!snap_after.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_AS_SOURCE));
}

/// Deleting a snapshot under a Delete content waits for the sidecar to
/// finish before the Bound finalizer is dropped.
#[tokio::test]
async fn deletion_delete_policy_awaits_sidecar_before_dropping_bound() {
    let (clients, snapshots, contents, _pvcs, _pvs) = harness();
    let (snap, content) = bound_pair(DeletionPolicy::Delete);
    snapshots.seed("ns1/s1", snap);
    contents.seed("snapcontent-uid-1", content);

    snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();

    // Content was API-deleted from the mock store (sidecar would finish the
    // physical reclaim in reality; here deletion of the object is immediate).
    assert!(contents.get(None, "snapcontent-uid-1").await.is_err());

    let snap_after = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert!(snap_after.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_BOUND));
    assert!(!snap_after.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_AS_SOURCE));

    // Following sync (sidecar has now "finished": content gone from cache)
    // drops Bound and the snapshot has no finalizers left.
    snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    let snap_final = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert!(snap_final.finalizers().is_empty());
}

/// An orphan content (no live snapshot references it) is never touched.
#[tokio::test]
async fn orphan_content_never_touched() {
    let (clients, _snapshots, contents, _pvcs, _pvs) = harness();

    let content = VolumeSnapshotContent::new(
        "c3",
        VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: "ghost".to_string(),
                namespace: "ns1".to_string(),
                uid: "ghost-uid".to_string(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: Some("vol-x".to_string()),
                snapshot_handle: None,
            },
            deletion_policy: DeletionPolicy::Delete,
            driver: "hostpath.csi.k8s.io".to_string(),
            volume_snapshot_class_name: None,
            source_volume_mode: None,
        },
    );
    contents.seed("c3", content);

    for _ in 0..3 {
        content_reconciler::reconcile(&clients, "c3").await.unwrap();
    }

    let after = contents.get(None, "c3").await.unwrap();
    assert!(!after.is_being_deleted());
}

/// A restore in flight from a snapshot blocks that snapshot's finalizer
/// removal until the restore completes.
#[tokio::test]
async fn restore_in_flight_blocks_finalizer_removal() {
    let (clients, snapshots, contents, pvcs, _pvs) = harness();
    let (snap, content) = bound_pair(DeletionPolicy::Retain);
    snapshots.seed("ns1/s1", snap);
    contents.seed("snapcontent-uid-1", content);

    let mut restoring_pvc = PersistentVolumeClaim {
        metadata: Default::default(),
        spec: Some(PersistentVolumeClaimSpec {
            data_source: Some(TypedLocalObjectReference {
                api_group: Some("snapshot.storage.k8s.io".to_string()),
                kind: "VolumeSnapshot".to_string(),
                name: "s1".to_string(),
            }),
            ..Default::default()
        }),
        status: Some(PersistentVolumeClaimStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        }),
    };
    restoring_pvc.metadata.name = Some("restore-target".to_string());
    restoring_pvc.metadata.namespace = Some("ns1".to_string());
    pvcs.seed("ns1/restore-target", restoring_pvc);

    let outcome = snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    assert!(matches!(outcome, snapshot_controller::reconcile::Outcome::Requeue));

    // No finalizers removed; content untouched.
    let snap_after = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert!(snap_after.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_BOUND));
    assert!(snap_after.finalizers().iter().any(|f| f == FINALIZER_SNAPSHOT_AS_SOURCE));
    let content_after = contents.get(None, "snapcontent-uid-1").await.unwrap();
    assert!(!content_after.is_being_deleted());
}

/// Reconciling an already up-to-date, ready, bound snapshot twice in a row
/// performs no further status writes.
#[tokio::test]
async fn fixpoint_idempotence_for_ready_snapshot() {
    let (clients, snapshots, contents, _pvcs, _pvs) = harness();
    let mut snap = VolumeSnapshot::new(
        "s1",
        VolumeSnapshotSpec {
            source: VolumeSnapshotSource {
                persistent_volume_claim_name: Some("pvc-a".to_string()),
                volume_snapshot_content_name: None,
            },
            volume_snapshot_class_name: None,
        },
    );
    snap.metadata.namespace = Some("ns1".to_string());
    snap.metadata.uid = Some("uid-1".to_string());
    snap.metadata.finalizers = Some(vec![
        FINALIZER_SNAPSHOT_AS_SOURCE.to_string(),
        FINALIZER_SNAPSHOT_BOUND.to_string(),
    ]);
    snap.status = Some(VolumeSnapshotStatus {
        bound_volume_snapshot_content_name: Some("snapcontent-uid-1".to_string()),
        creation_time: Some(Time(chrono::DateTime::from_timestamp(1_700_000_000, 0).unwrap())),
        ready_to_use: Some(true),
        restore_size: None,
        error: None,
        group_snapshot_name: None,
    });
    snapshots.seed("ns1/s1", snap);

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
    contents.seed("snapcontent-uid-1", content);

    let first = snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    let after_first = snapshots.get(Some("ns1"), "s1").await.unwrap();
    let second = snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    let after_second = snapshots.get(Some("ns1"), "s1").await.unwrap();

    assert!(matches!(first, snapshot_controller::reconcile::Outcome::Synced));
    assert!(matches!(second, snapshot_controller::reconcile::Outcome::Synced));
    assert_eq!(after_first.status, after_second.status);
    assert_eq!(after_first.metadata.finalizers, after_second.metadata.finalizers);
}

/// Sanity check that an unrelated dummy class is never selected.
#[tokio::test]
async fn default_class_with_matching_driver_is_ignored_when_already_set() {
    let (clients, snapshots, _contents, pvcs, pvs) = harness();
    pvcs.seed("ns1/pvc-a", bound_claim("pvc-a", "pv-a"));
    pvs.seed("pv-a", csi_pv("pv-a", "hostpath.csi.k8s.io", "handle-a"));

    let class = VolumeSnapshotClass::new(
        "already-set",
        VolumeSnapshotClassSpec {
            driver: "hostpath.csi.k8s.io".to_string(),
            deletion_policy: DeletionPolicy::Delete,
            parameters: Default::default(),
        },
    );
    clients.classes.create(None, &class).await.unwrap();

    let snap = dynamic_snapshot("s1", "uid-1", "pvc-a", Some("already-set"));
    snapshots.seed("ns1/s1", snap);

    snapshot_reconciler::reconcile(&clients, "ns1", "s1").await.unwrap();
    let after = snapshots.get(Some("ns1"), "s1").await.unwrap();
    assert_eq!(after.spec.volume_snapshot_class_name.as_deref(), Some("already-set"));
}
