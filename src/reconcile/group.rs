//! Group Orchestrator, GroupSnapshot half.
//!
//! Mirrors the Snapshot Reconciler's dynamic-provisioning path, but fans
//! out over every PVC matched by the group's label selector: one member
//! `VolumeSnapshot` per matched PVC, each carrying the `InGroup` finalizer
//! and `status.groupSnapshotName` pointing back at this object. The group
//! creates the content and member snapshots here; each member's own
//! reconcile pass then picks up its `BoundContentName` and links status
//! the same way a standalone dynamic snapshot would.

use std::collections::BTreeMap;

use kube::api::ListParams;
use kube::ResourceExt;

use crate::clients::Clients;
use crate::crd::{
    DeletionPolicy, GroupSnapshot, GroupSnapshotClass, GroupSnapshotContent,
    GroupSnapshotContentSpec, VolumeSnapshot, VolumeSnapshotRef, VolumeSnapshotSource,
    VolumeSnapshotSpec, FINALIZER_SNAPSHOT_IN_GROUP,
};
use crate::error::{Error, Result};
use crate::util;

use super::{Outcome, ReconcileResult};

fn dynamic_group_content_name(group: &GroupSnapshot) -> String {
    util::dynamic_group_content_name(&group.uid().unwrap_or_default())
}

pub async fn reconcile(clients: &Clients, namespace: &str, name: &str) -> ReconcileResult {
    let group = match clients.groups.get(Some(namespace), name).await {
        Ok(g) => g,
        Err(Error::NotFound(_)) => return Ok(Outcome::Synced),
        Err(e) => return Err(e),
    };

    if group.metadata.deletion_timestamp.is_some() {
        return delete_group(clients, namespace, &group).await;
    }

    let source_valid = group.spec.source.selector.is_some()
        ^ group.spec.source.volume_group_snapshot_content_name.is_some();
    if !source_valid {
        return Err(Error::Validation(format!(
            "group snapshot {name}: exactly one of spec.source.selector or \
             spec.source.volumeGroupSnapshotContentName must be set"
        )));
    }

    let bound_name = group
        .status
        .as_ref()
        .and_then(|s| s.bound_volume_group_snapshot_content_name.clone());

    let content_name = match bound_name {
        Some(n) => n,
        None => match &group.spec.source.volume_group_snapshot_content_name {
            Some(n) => n.clone(),
            None => create_dynamic_group(clients, namespace, &group).await?,
        },
    };

    let content = match clients.group_contents.get(None, &content_name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => return Ok(Outcome::Requeue),
        Err(e) => return Err(e),
    };

    sync_group_status(clients, namespace, &group, &content, &content_name).await
}

async fn create_dynamic_group(clients: &Clients, namespace: &str, group: &GroupSnapshot) -> Result<String> {
    let selector = group
        .spec
        .source
        .selector
        .clone()
        .ok_or_else(|| Error::Validation("group snapshot has no selector to match source PVCs".into()))?;

    let class_name = group.spec.volume_group_snapshot_class_name.clone();
    let class: Option<GroupSnapshotClass> = match &class_name {
        Some(n) => clients.group_classes.get(None, n).await.ok(),
        None => None,
    };
    let deletion_policy = class
        .as_ref()
        .map(|c: &GroupSnapshotClass| c.spec.deletion_policy)
        .unwrap_or(DeletionPolicy::Delete);
    let driver = class
        .as_ref()
        .map(|c| c.spec.driver.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let content_name = dynamic_group_content_name(group);
    let content = GroupSnapshotContent {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(content_name.clone()),
            ..Default::default()
        },
        spec: GroupSnapshotContentSpec {
            volume_group_snapshot_ref: VolumeSnapshotRef {
                name: group.name_any(),
                namespace: namespace.to_string(),
                uid: group.uid().unwrap_or_default(),
            },
            deletion_policy,
            driver,
            volume_group_snapshot_class_name: class_name,
            source_volume_handles: Vec::new(),
        },
        status: None,
    };
    clients.group_contents.create(None, &content).await?;

    let patch = serde_json::json!({
        "status": { "boundVolumeGroupSnapshotContentName": content_name }
    });
    clients
        .groups
        .patch_status_merge(Some(namespace), &group.name_any(), &patch)
        .await?;

    create_member_snapshots(clients, namespace, group, &selector).await?;

    Ok(content_name)
}

/// Create one member `VolumeSnapshot` per PVC matched by `selector`, unless
/// a member with the deterministic owned-name already exists (idempotent
/// on replays, mirroring the individual reconciler's `AlreadyExists`
/// tolerance).
async fn create_member_snapshots(
    clients: &Clients,
    namespace: &str,
    group: &GroupSnapshot,
    selector: &BTreeMap<String, String>,
) -> Result<()> {
    let label_selector = selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    let params = ListParams::default().labels(&label_selector);
    let claims = clients.pvcs.list(Some(namespace), &params).await?;

    let mut member_names = Vec::new();
    for claim in claims {
        let claim_name = claim.name_any();
        let member_name = format!("{}-{}", group.name_any(), claim_name);
        member_names.push(member_name.clone());
        if clients.snapshots.get(Some(namespace), &member_name).await.is_ok() {
            continue;
        }
        let mut member = VolumeSnapshot::new(
            &member_name,
            VolumeSnapshotSpec {
                source: VolumeSnapshotSource {
                    persistent_volume_claim_name: Some(claim_name),
                    volume_snapshot_content_name: None,
                },
                volume_snapshot_class_name: None,
            },
        );
        member.metadata.namespace = Some(namespace.to_string());
        member.metadata.finalizers = Some(vec![FINALIZER_SNAPSHOT_IN_GROUP.to_string()]);
        clients.snapshots.create(Some(namespace), &member).await?;

        let patch = serde_json::json!({ "status": { "groupSnapshotName": group.name_any() } });
        clients
            .snapshots
            .patch_status_merge(Some(namespace), &member_name, &patch)
            .await?;
    }

    if !member_names.is_empty() {
        let patch = serde_json::json!({ "status": { "volumeSnapshotRefs": member_names } });
        clients
            .groups
            .patch_status_merge(Some(namespace), &group.name_any(), &patch)
            .await?;
    }
    Ok(())
}

async fn sync_group_status(
    clients: &Clients,
    namespace: &str,
    group: &GroupSnapshot,
    content: &GroupSnapshotContent,
    content_name: &str,
) -> ReconcileResult {
    let content_status = match &content.status {
        Some(s) => s,
        None => return Ok(Outcome::Synced),
    };

    let was_ready = group.status.as_ref().and_then(|s| s.ready_to_use).unwrap_or(false);
    let now_ready = content_status.ready_to_use.unwrap_or(false);
    if was_ready == now_ready && group.status.as_ref().map(|s| s.bound_volume_group_snapshot_content_name.as_deref()) == Some(Some(content_name)) {
        return Ok(Outcome::Synced);
    }

    let patch = serde_json::json!({
        "status": {
            "boundVolumeGroupSnapshotContentName": content_name,
            "readyToUse": content_status.ready_to_use,
        }
    });
    clients
        .groups
        .patch_status_merge(Some(namespace), &group.name_any(), &patch)
        .await?;
    Ok(Outcome::Synced)
}

/// Group deletion: member cleanup is left to each member snapshot's own
/// deletion protocol — once the group is gone, each member observes
/// `NotFound` on its next sync and clears its own `InGroup` finalizer.
/// This reconciler's job is only to release its own content per policy.
async fn delete_group(clients: &Clients, namespace: &str, group: &GroupSnapshot) -> ReconcileResult {
    if let Some(content_name) = group
        .status
        .as_ref()
        .and_then(|s| s.bound_volume_group_snapshot_content_name.clone())
    {
        if let Ok(content) = clients.group_contents.get(None, &content_name).await {
            clients
                .group_contents
                .patch_merge(None, &content_name, &GroupSnapshotContent::being_deleted_patch())
                .await?;
            if content.spec.deletion_policy == DeletionPolicy::Delete {
                clients.group_contents.delete(None, &content_name).await?;
            }
        }
    }

    let patch = serde_json::json!({ "metadata": { "finalizers": null } });
    clients
        .groups
        .patch_merge(Some(namespace), &group.name_any(), &patch)
        .await?;
    Ok(Outcome::Synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_ops::MockApiOps;
    use crate::crd::GroupSnapshotSource;
    use std::sync::Arc;

    fn harness() -> Clients {
        Clients {
            client: crate::status::test_support::fake_client(),
            snapshots: Arc::new(MockApiOps::new()),
            contents: Arc::new(MockApiOps::new()),
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
        }
    }

    fn group_with_selector(uid: &str) -> GroupSnapshot {
        let mut g = GroupSnapshot::new(
            "g1",
            crate::crd::GroupSnapshotSpec {
                source: GroupSnapshotSource {
                    selector: Some(BTreeMap::from([("app".to_string(), "db".to_string())])),
                    volume_group_snapshot_content_name: None,
                },
                volume_group_snapshot_class_name: None,
            },
        );
        g.metadata.namespace = Some("ns1".to_string());
        g.metadata.uid = Some(uid.to_string());
        g
    }

    #[tokio::test]
    async fn rejects_both_selector_and_content_name() {
        let clients = harness();
        let mut g = group_with_selector("uid-1");
        g.spec.source.volume_group_snapshot_content_name = Some("precreated".to_string());
        clients.groups.seed("ns1/g1", g);
        let err = reconcile(&clients, "ns1", "g1").await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn dynamic_creation_fans_out_one_snapshot_per_matched_claim() {
        let clients = harness();
        let g = group_with_selector("uid-1");
        clients.groups.seed("ns1/g1", g);

        let mut claim = k8s_openapi::api::core::v1::PersistentVolumeClaim::default();
        claim.metadata.name = Some("pvc-a".to_string());
        claim.metadata.namespace = Some("ns1".to_string());
        claim.metadata.labels = Some(std::collections::BTreeMap::from([(
            "app".to_string(),
            "db".to_string(),
        )]));
        clients.pvcs.seed("ns1/pvc-a", claim);

        let outcome = reconcile(&clients, "ns1", "g1").await.unwrap();
        assert!(matches!(outcome, Outcome::Synced));

        let member = clients.snapshots.get(Some("ns1"), "g1-pvc-a").await.unwrap();
        assert_eq!(
            member.finalizers().iter().next().map(String::as_str),
            Some(FINALIZER_SNAPSHOT_IN_GROUP)
        );

        let group_after = clients.groups.get(Some("ns1"), "g1").await.unwrap();
        let content_name = group_after
            .status
            .as_ref()
            .and_then(|s| s.bound_volume_group_snapshot_content_name.clone())
            .unwrap();
        assert!(clients.group_contents.get(None, &content_name).await.is_ok());
    }

    #[tokio::test]
    async fn pre_provisioned_content_name_is_used_directly() {
        let clients = harness();
        let mut g = GroupSnapshot::new(
            "g1",
            crate::crd::GroupSnapshotSpec {
                source: GroupSnapshotSource {
                    selector: None,
                    volume_group_snapshot_content_name: Some("precreated".to_string()),
                },
                volume_group_snapshot_class_name: None,
            },
        );
        g.metadata.namespace = Some("ns1".to_string());
        clients.groups.seed("ns1/g1", g);

        let outcome = reconcile(&clients, "ns1", "g1").await.unwrap();
        assert!(matches!(outcome, Outcome::Requeue));
    }

    #[tokio::test]
    async fn delete_releases_content_per_delete_policy() {
        let clients = harness();
        let mut g = group_with_selector("uid-1");
        g.metadata.deletion_timestamp = Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
            chrono::Utc::now(),
        ));
        g.metadata.finalizers = Some(vec!["groupsnapshot.storage.k8s.io/group-protection".to_string()]);
        g.status = Some(crate::crd::GroupSnapshotStatus {
            bound_volume_group_snapshot_content_name: Some("groupsnapcontent-uid-1".to_string()),
            creation_time: None,
            ready_to_use: Some(true),
            volume_snapshot_refs: vec![],
            error: None,
        });
        clients.groups.seed("ns1/g1", g);

        let content = GroupSnapshotContent {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some("groupsnapcontent-uid-1".to_string()),
                ..Default::default()
            },
            spec: GroupSnapshotContentSpec {
                volume_group_snapshot_ref: VolumeSnapshotRef {
                    name: "g1".to_string(),
                    namespace: "ns1".to_string(),
                    uid: "uid-1".to_string(),
                },
                deletion_policy: DeletionPolicy::Delete,
                driver: "hostpath.csi.k8s.io".to_string(),
                volume_group_snapshot_class_name: None,
                source_volume_handles: vec![],
            },
            status: None,
        };
        clients.group_contents.seed("groupsnapcontent-uid-1", content);

        let outcome = reconcile(&clients, "ns1", "g1").await.unwrap();
        assert!(matches!(outcome, Outcome::Synced));
        assert!(clients
            .group_contents
            .get(None, "groupsnapcontent-uid-1")
            .await
            .is_err());
        let after = clients.groups.get(Some("ns1"), "g1").await.unwrap();
        assert!(after.finalizers().is_empty());
    }
}
