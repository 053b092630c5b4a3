//! Status Synchronizer and snapshot error-status write.
//!
//! Recomputes a Snapshot's status from its bound Content's status and
//! detects the two one-shot lifecycle edges (`not-created → created`,
//! `not-ready → ready`) that must emit an event and record a metric exactly
//! once per snapshot lifetime.

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ListParams;
use kube::{Client, ResourceExt};

use crate::api_ops::ApiOps;
use crate::crd::{
    SnapshotError, VolumeSnapshot, VolumeSnapshotContent, VolumeSnapshotStatus,
};
use crate::error::Result;
use crate::events::{publish, Reason};
use crate::metrics::{record_reconcile, Operation, Outcome};

/// True when the snapshot's current status has drifted from what its bound
/// content now reports, meaning a status write is needed.
pub fn needs_status_update(snapshot: &VolumeSnapshot, content: &VolumeSnapshotContent) -> bool {
    let status = match &snapshot.status {
        None => return content.status.is_some(),
        Some(s) => s,
    };
    if status.bound_volume_snapshot_content_name.is_none() {
        return true;
    }
    let content_status = match &content.status {
        None => return false,
        Some(cs) => cs,
    };
    if status.creation_time.is_none() && content_status.creation_time.is_some() {
        return true;
    }
    if status.ready_to_use != content_status.ready_to_use {
        return true;
    }
    let restore_is_zero_or_unset = match &status.restore_size {
        None => true,
        Some(q) => q.0 == "0",
    };
    if restore_is_zero_or_unset {
        if let Some(size) = content_status.restore_size {
            if size > 0 {
                return true;
            }
        }
    }
    false
}

/// Outcome of one status-sync pass, surfaced so the reconciler can emit the
/// right events/metrics and know whether an API write actually happened.
pub struct SyncResult {
    pub snapshot: VolumeSnapshot,
    pub became_created: bool,
    pub became_ready: bool,
    pub wrote: bool,
}

/// Outcome of resolving a content's group membership, distinguishing "not a
/// group member at all" from "is a group member but the group-content that
/// would name it hasn't shown up yet". The latter must defer the status
/// write rather than proceed with a blank group name, since a caller that
/// can't tell the two apart would otherwise wipe out a group link that's
/// simply slow to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupNameResolution {
    /// The content carries no group handle; it isn't a group member.
    NoGroup,
    /// The content's group handle matched a group-content, naming the group.
    Resolved(String),
    /// The content carries a group handle, but no group-content currently
    /// reports a matching one. Caller should skip the status write and
    /// retry on the next pass.
    Pending,
}

/// Resolve the owning group's name by scanning a group-content listing for
/// a handle match.
pub async fn resolve_group_name<A>(
    content: &VolumeSnapshotContent,
    group_content_api: &A,
) -> Result<GroupNameResolution>
where
    A: ApiOps<crate::crd::GroupSnapshotContent>,
{
    let handle = match content.status.as_ref().and_then(|s| s.volume_group_snapshot_handle.clone()) {
        Some(h) => h,
        None => return Ok(GroupNameResolution::NoGroup),
    };
    let listing = group_content_api.list(None, &ListParams::default()).await?;
    Ok(listing
        .into_iter()
        .find(|gc| gc.status.as_ref().and_then(|s| s.volume_group_snapshot_handle.as_deref()) == Some(handle.as_str()))
        .map(|gc| GroupNameResolution::Resolved(gc.spec.volume_group_snapshot_ref.name.clone()))
        .unwrap_or(GroupNameResolution::Pending))
}

/// Build the new status in place, without performing the API write.
/// `group_name` is `None` when the content has no group handle at all;
/// callers must not call this with a "pending" resolution (a handle present
/// but not yet resolvable) — that case should skip the write and retry
/// instead, handled by the caller before reaching this function.
fn build_status(
    previous: Option<&VolumeSnapshotStatus>,
    content: &VolumeSnapshotContent,
    content_name: &str,
    group_name: Option<String>,
) -> VolumeSnapshotStatus {
    let content_status = content.status.clone().unwrap_or_default();
    let ready_to_use = content_status.ready_to_use;

    let mut error = content_status.error.clone();
    if ready_to_use == Some(true) {
        error = None;
    }

    VolumeSnapshotStatus {
        bound_volume_snapshot_content_name: Some(content_name.to_string()),
        creation_time: previous
            .and_then(|p| p.creation_time.clone())
            .or_else(|| content_status.creation_time.map(nanos_to_time)),
        ready_to_use,
        restore_size: content_status.restore_size.map(bytes_to_quantity),
        error,
        group_snapshot_name: group_name.or_else(|| previous.and_then(|p| p.group_snapshot_name.clone())),
    }
}

fn nanos_to_time(nanos: i64) -> Time {
    use chrono::{DateTime, TimeZone};
    let dt: DateTime<Utc> = Utc.timestamp_nanos(nanos);
    Time(dt)
}

fn bytes_to_quantity(bytes: i64) -> Quantity {
    Quantity(bytes.to_string())
}

/// Run the status synchronizer for one (snapshot, content) pair, writing
/// the status via `api` only if `needs_status_update` says a write is
/// required. `group_name` must already have been resolved (or confirmed
/// absent) by the caller via `resolve_group_name`.
pub async fn sync_status<A>(
    api: &A,
    client: &Client,
    snapshot: &VolumeSnapshot,
    content: &VolumeSnapshotContent,
    content_name: &str,
    group_name: Option<String>,
) -> Result<SyncResult>
where
    A: ApiOps<VolumeSnapshot>,
{
    if !needs_status_update(snapshot, content) {
        return Ok(SyncResult {
            snapshot: snapshot.clone(),
            became_created: false,
            became_ready: false,
            wrote: false,
        });
    }

    let was_created = snapshot.status.as_ref().and_then(|s| s.creation_time.as_ref()).is_some();
    let was_ready = snapshot.is_ready();

    let new_status = build_status(snapshot.status.as_ref(), content, content_name, group_name);
    let became_created = !was_created && new_status.creation_time.is_some();
    let became_ready = !was_ready && new_status.ready_to_use == Some(true);

    // Metric must be recorded before the API write: a conflict retry on
    // the write must not lose the edge signal.
    let driver = content.spec.driver.clone();
    if became_created {
        crate::metrics::OperationTimer::start(Operation::CreateSnapshot, driver.clone())
            .record(Outcome::Success);
    }
    if became_ready {
        crate::metrics::OperationTimer::start(Operation::CreateSnapshotAndReady, driver)
            .record(Outcome::Success);
    }

    let patch = serde_json::json!({ "status": new_status });
    let updated = api
        .patch_status_merge(
            snapshot.namespace().as_deref(),
            &snapshot.name_any(),
            &patch,
        )
        .await?;

    if became_created {
        publish(client, &updated, Reason::SnapshotCreated, "Snapshot creation succeeded").await;
    }
    if became_ready {
        publish(client, &updated, Reason::SnapshotReady, "Snapshot is ready to use").await;
    }

    Ok(SyncResult {
        snapshot: updated,
        became_created,
        became_ready,
        wrote: true,
    })
}

/// Write `status.error` on a snapshot. `flip_not_ready` controls
/// whether `readyToUse` is forced to `false` — callers must pass `false`
/// once the snapshot has ever become ready, since a transient error must
/// not regress a previously-achieved ready state.
pub async fn write_snapshot_error<A>(
    api: &A,
    client: &Client,
    snapshot: &VolumeSnapshot,
    message: impl Into<String>,
    flip_not_ready: bool,
) -> Result<VolumeSnapshot>
where
    A: ApiOps<VolumeSnapshot>,
{
    let message = message.into();
    let already_present = snapshot
        .status
        .as_ref()
        .and_then(|s| s.error.as_ref())
        .and_then(|e| e.message.as_ref())
        == Some(&message);
    if already_present {
        return Ok(snapshot.clone());
    }

    let mut status = serde_json::Map::new();
    status.insert(
        "error".to_string(),
        serde_json::to_value(SnapshotError {
            time: Some(Time(Utc::now())),
            message: Some(message.clone()),
        })?,
    );
    if flip_not_ready {
        status.insert("readyToUse".to_string(), serde_json::Value::Bool(false));
    }
    let patch = serde_json::json!({ "status": status });

    let updated = api
        .patch_status_merge(
            snapshot.namespace().as_deref(),
            &snapshot.name_any(),
            &patch,
        )
        .await?;
    publish(client, &updated, Reason::SnapshotValidationError, message).await;
    record_reconcile("VolumeSnapshot", "error");
    Ok(updated)
}


/// A `Client` that is never actually dialed, for tests that need to satisfy
/// a function signature but exercise a code path that returns before any
/// network call would happen.
#[cfg(test)]
pub(crate) mod test_support {
    pub fn fake_client() -> kube::Client {
        kube::Client::try_from(kube::Config::new("https://127.0.0.1:1".parse().unwrap())).unwrap()
    }
}
