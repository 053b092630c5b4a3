//! Content Reconciler.
//!
//! Counterpart to the Snapshot Reconciler: validates the content's own
//! source exclusivity, protects it with `ContentProtection` once it is
//! bound, cross-triggers the bound snapshot's key on status drift, and
//! marks the content "being-deleted" when its snapshot starts deleting —
//! but never when the snapshot is gone. That last rule protects against a
//! user copy/pasting the same content YAML back in after a snapshot it
//! once belonged to was deleted.

use kube::ResourceExt;

use crate::clients::Clients;
use crate::crd::VolumeSnapshotContent;
use crate::error::{Error, Result};
use crate::status;
use crate::util;

use super::{Outcome, ReconcileResult};

/// Entry point for one content key (cluster-scoped, so `name` alone).
pub async fn reconcile(clients: &Clients, name: &str) -> ReconcileResult {
    let content = match clients.contents.get(None, name).await {
        Ok(c) => c,
        Err(Error::NotFound(_)) => return Ok(Outcome::Synced),
        Err(e) => return Err(e),
    };

    // Source must be exactly one of volumeHandle / snapshotHandle.
    if !content.spec.source.is_valid() {
        let msg = format!(
            "content {name}: exactly one of spec.source.volumeHandle or \
             spec.source.snapshotHandle must be set"
        );
        tracing::warn!("{msg}");
        return Err(Error::Validation(msg));
    }

    // ref.UID empty means this content is pre-provisioned; binding happens
    // on the snapshot side instead.
    if content.spec.volume_snapshot_ref.uid.is_empty() {
        return Ok(Outcome::Synced);
    }

    crate::finalizers::protect_content(&*clients.contents, &content).await?;

    // Look up the bound snapshot by its ref key.
    let snapshot_ref = &content.spec.volume_snapshot_ref;
    let snapshot = match clients
        .snapshots
        .get(Some(&snapshot_ref.namespace), &snapshot_ref.name)
        .await
    {
        Ok(s) => {
            // A namesake with a different UID means the original snapshot
            // this content was bound to was already deleted, and what's
            // there now is an unrelated object that happens to share a
            // name: treat it the same as if nothing were found.
            if s.uid().as_deref() != Some(snapshot_ref.uid.as_str()) {
                None
            } else {
                Some(s)
            }
        }
        Err(Error::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let snapshot = match snapshot {
        Some(s) => s,
        // An orphan content — no live snapshot references it — is left
        // completely untouched, so a user re-applying old content YAML
        // can never trigger deletion on its own.
        None => return Ok(Outcome::Synced),
    };

    if status::needs_status_update(&snapshot, &content) {
        clients
            .snapshot_queue
            .add(util::namespaced_key(&snapshot_ref.namespace, &snapshot_ref.name))
            .await;
    }

    // Mark the content being-deleted only while the snapshot is alive, a
    // deletion candidate, and not itself the source of an in-flight
    // restore (a restore PVC referencing it as a DataSource and still
    // Pending) — tearing the content down mid-restore would break that
    // restore.
    if util::wants_content_deletion_annotation(&snapshot) && !content.is_being_deleted() {
        let restoring = super::snapshot::restore_in_flight(clients, &snapshot_ref.namespace, &snapshot).await?;
        if !restoring {
            clients
                .contents
                .patch_merge(None, name, &VolumeSnapshotContent::being_deleted_patch())
                .await?;
        }
    }

    Ok(Outcome::Synced)
}
