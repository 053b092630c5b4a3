//! Group Orchestrator, GroupSnapshotContent half.
//!
//! Counterpart to the Content Reconciler: looks up the bound
//! `GroupSnapshot` by ref, re-triggers its key on status drift so its own
//! `readyToUse`/`boundVolumeGroupSnapshotContentName` converge quickly, and
//! marks itself being-deleted once the owning group starts deleting. An
//! orphaned content (its group already gone) is left untouched, the same
//! do-not-cascade rule the individual Content Reconciler applies.

use kube::ResourceExt;

use crate::clients::Clients;
use crate::crd::GroupSnapshotContent;
use crate::error::{Error, Result};
use crate::util;

use super::{Outcome, ReconcileResult};

/// Entry point for one group-content key (cluster-scoped, so `name` alone).
pub async fn reconcile(clients: &Clients, name: &str) -> ReconcileResult {
    let content = match clients.group_contents.get(None, name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => return Ok(Outcome::Synced),
        Err(e) => return Err(e),
    };

    let group_ref = &content.spec.volume_group_snapshot_ref;
    if group_ref.uid.is_empty() {
        // Pre-provisioned: binding happens group-side, same as the
        // individual content's empty-UID case.
        return Ok(Outcome::Synced);
    }

    let group = match clients
        .groups
        .get(Some(&group_ref.namespace), &group_ref.name)
        .await
    {
        Ok(g) => {
            if g.uid().as_deref() != Some(group_ref.uid.as_str()) {
                None
            } else {
                Some(g)
            }
        }
        Err(Error::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let group = match group {
        Some(g) => g,
        None => return Ok(Outcome::Synced),
    };

    let status_drifted = match (&group.status, &content.status) {
        (Some(gs), Some(cs)) => gs.ready_to_use != cs.ready_to_use,
        (None, Some(_)) => true,
        _ => false,
    };
    if status_drifted {
        clients
            .group_queue
            .add(util::namespaced_key(&group_ref.namespace, &group_ref.name))
            .await;
    }

    if group.metadata.deletion_timestamp.is_some() && !content.is_being_deleted() {
        clients
            .group_contents
            .patch_merge(None, name, &GroupSnapshotContent::being_deleted_patch())
            .await?;
    }

    Ok(Outcome::Synced)
}
