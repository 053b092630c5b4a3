//! Event emission.
//!
//! Thin wrapper around `kube::runtime::events::Recorder` so reconcilers can
//! emit structured `{type, reason, message}` events without repeating the
//! `Reporter` / object-reference plumbing at every call site.

use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};

/// Every event `reason` this controller ever emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    ContentValidationError,
    SnapshotContentMissing,
    SnapshotContentMisbound,
    SnapshotContentMismatch,
    SnapshotBindFailed,
    SnapshotCreated,
    SnapshotReady,
    SnapshotDeletePending,
    CreatingSnapshot,
    CreateSnapshotContentFailed,
    SnapshotStatusUpdateFailed,
    SnapshotPVCSourceMissing,
    SnapshotHandleSet,
    SnapshotValidationError,
    SnapshotFinalizerError,
    ErrorPVCFinalizer,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ContentValidationError => "ContentValidationError",
            Reason::SnapshotContentMissing => "SnapshotContentMissing",
            Reason::SnapshotContentMisbound => "SnapshotContentMisbound",
            Reason::SnapshotContentMismatch => "SnapshotContentMismatch",
            Reason::SnapshotBindFailed => "SnapshotBindFailed",
            Reason::SnapshotCreated => "SnapshotCreated",
            Reason::SnapshotReady => "SnapshotReady",
            Reason::SnapshotDeletePending => "SnapshotDeletePending",
            Reason::CreatingSnapshot => "CreatingSnapshot",
            Reason::CreateSnapshotContentFailed => "CreateSnapshotContentFailed",
            Reason::SnapshotStatusUpdateFailed => "SnapshotStatusUpdateFailed",
            Reason::SnapshotPVCSourceMissing => "SnapshotPVCSourceMissing",
            Reason::SnapshotHandleSet => "SnapshotHandleSet",
            Reason::SnapshotValidationError => "SnapshotValidationError",
            Reason::SnapshotFinalizerError => "SnapshotFinalizerError",
            Reason::ErrorPVCFinalizer => "ErrorPVCFinalizer",
        }
    }

    /// Normal events mark expected progress; everything else is Warning.
    pub fn event_type(&self) -> EventType {
        match self {
            Reason::SnapshotCreated
            | Reason::SnapshotReady
            | Reason::CreatingSnapshot
            | Reason::SnapshotHandleSet => EventType::Normal,
            _ => EventType::Warning,
        }
    }
}

pub fn reporter() -> Reporter {
    Reporter {
        controller: "snapshot-controller".into(),
        instance: std::env::var("POD_NAME").ok(),
    }
}

pub async fn publish<K>(client: &Client, object: &K, reason: Reason, message: impl Into<String>)
where
    K: Resource<DynamicType = ()>,
{
    let recorder = Recorder::new(client.clone(), reporter());
    let result = recorder
        .publish(
            &Event {
                type_: reason.event_type(),
                reason: reason.as_str().into(),
                note: Some(message.into()),
                action: "Reconcile".into(),
                secondary: None,
            },
            &object.object_ref(&()),
        )
        .await;
    if let Err(e) = result {
        tracing::warn!(error = %e, reason = reason.as_str(), "failed to publish event");
    }
}
