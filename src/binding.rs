//! Binding Resolver.
//!
//! Finds the content that *should* be paired with a given snapshot and
//! verifies bi-directional reference integrity. This module
//! never writes to the API server itself beyond the one small bind-patch
//! operation that mutates `ref.uid`; every other write stays in the
//! reconciler that owns the decision.

use crate::crd::{VolumeSnapshot, VolumeSnapshotContent};
use kube::ResourceExt;

#[derive(Debug, PartialEq, Eq)]
pub enum BindOutcome {
    /// Content found and correctly bound (or just patched to be so).
    Bound,
    /// No content exists yet at the expected name.
    Missing,
    /// A content exists at the expected name but is bound to a different
    /// snapshot (or is the wrong shape) — the fatal "misbound" case.
    Misbound(String),
}

/// Resolve a pre-provisioned bind: the content named directly by the
/// snapshot's `spec.source.contentName`.
///
/// `content` must already have been fetched by exact name
/// (`spec.source.contentName`).
pub fn resolve_pre_provisioned(
    snapshot: &VolumeSnapshot,
    content: &VolumeSnapshotContent,
) -> BindOutcome {
    if content.is_dynamic() {
        return BindOutcome::Misbound(format!(
            "content {} is dynamically provisioned, cannot be used as a pre-provisioned source",
            content.name_any()
        ));
    }

    let want_name = snapshot.name_any();
    let want_namespace = snapshot.namespace().unwrap_or_default();
    let got_ref = &content.spec.volume_snapshot_ref;
    if got_ref.name != want_name || got_ref.namespace != want_namespace {
        return BindOutcome::Misbound(format!(
            "content {} is bound to a different snapshot ({}/{})",
            content.name_any(),
            got_ref.namespace,
            got_ref.name
        ));
    }

    // ref.UID empty is acceptable pre-bind; equal is fine; anything else
    // is a stale/foreign UID.
    if !got_ref.uid.is_empty() {
        if let Some(uid) = snapshot.uid() {
            if got_ref.uid != uid {
                return BindOutcome::Misbound(format!(
                    "content {} ref.uid does not match snapshot uid",
                    content.name_any()
                ));
            }
        }
    }

    BindOutcome::Bound
}

/// Resolve a dynamic standalone lookup: content located by the
/// deterministic name derived from the snapshot's UID.
pub fn resolve_dynamic(
    snapshot: &VolumeSnapshot,
    content: &VolumeSnapshotContent,
) -> BindOutcome {
    if !content.is_dynamic() {
        return BindOutcome::Misbound(format!(
            "content {} is pre-provisioned (snapshotHandle set), cannot be the dynamic target",
            content.name_any()
        ));
    }

    let got_ref = &content.spec.volume_snapshot_ref;
    let want_uid = snapshot.uid().unwrap_or_default();
    // For dynamic content ref.UID empty is NOT acceptable — it must be set
    // at creation time.
    if got_ref.uid.is_empty() || got_ref.uid != want_uid {
        return BindOutcome::Misbound(format!(
            "content {} ref.uid does not match snapshot uid {want_uid}",
            content.name_any()
        ));
    }
    if got_ref.name != snapshot.name_any()
        || got_ref.namespace != snapshot.namespace().unwrap_or_default()
    {
        return BindOutcome::Misbound(format!(
            "content {} is bound to a different snapshot",
            content.name_any()
        ));
    }

    BindOutcome::Bound
}

/// Verify the bi-directional reference still holds for an already-bound
/// pair. Returns `Ok(())` when intact, `Err(message)` describing the
/// violation otherwise.
pub fn verify_bound_integrity(
    snapshot: &VolumeSnapshot,
    content: &VolumeSnapshotContent,
) -> Result<(), String> {
    let got_ref = &content.spec.volume_snapshot_ref;
    if got_ref.name != snapshot.name_any()
        || got_ref.namespace != snapshot.namespace().unwrap_or_default()
    {
        return Err(format!(
            "content {} no longer references this snapshot",
            content.name_any()
        ));
    }
    if content.is_dynamic() {
        let want_uid = snapshot.uid().unwrap_or_default();
        if got_ref.uid != want_uid {
            return Err(format!(
                "content {} ref.uid drifted from snapshot uid",
                content.name_any()
            ));
        }
    }
    Ok(())
}

/// Build the merge-patch that binds `content.spec.volumeSnapshotRef.uid`
/// (and, if absent, `volumeSnapshotClassName`) to `snapshot`. Idempotent:
/// safe to apply on replays.
pub fn bind_patch(snapshot: &VolumeSnapshot, existing_class_name: Option<&str>) -> serde_json::Value {
    let mut spec = serde_json::Map::new();
    spec.insert(
        "volumeSnapshotRef".to_string(),
        serde_json::json!({ "uid": snapshot.uid().unwrap_or_default() }),
    );
    if existing_class_name.is_none() {
        if let Some(class_name) = &snapshot.spec.volume_snapshot_class_name {
            spec.insert(
                "volumeSnapshotClassName".to_string(),
                serde_json::Value::String(class_name.clone()),
            );
        }
    }
    serde_json::json!({ "spec": spec })
}
