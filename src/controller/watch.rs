//! Turns a `kube::runtime::watcher` stream into two things: a `Mirror<K>`
//! (the read-only cache) kept current by the reflector, and a background
//! task that enqueues the touched object's key on every watch event — the
//! primary source of work, topped up by the periodic resync in
//! `controller::mod`.

use std::fmt::Debug;

use futures::StreamExt;
use kube::api::Api;
use kube::runtime::reflector::{self, reflector};
use kube::runtime::watcher::{self, watcher};
use kube::runtime::WatchStreamExt;
use kube::Resource;
use serde::de::DeserializeOwned;

use crate::queue::WorkQueue;
use crate::store::Mirror;

/// Starts watching `api`, feeding `queue` via `key_of`. Returns the live
/// `Mirror` immediately; the feeder task keeps running until the process
/// exits (watcher streams reconnect on their own after transient errors).
pub fn spawn<K, F>(api: Api<K>, queue: WorkQueue<String>, key_of: F) -> Mirror<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&K) -> String + Send + Sync + 'static,
{
    let (store, writer) = reflector::store::<K>();
    let mirror = Mirror::new(store);

    tokio::spawn(async move {
        let stream =
            reflector(writer, watcher(api, watcher::Config::default()).default_backoff())
                .applied_objects();
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event {
                Ok(obj) => queue.add(key_of(&obj)).await,
                Err(e) => tracing::warn!(error = %e, "watch stream error"),
            }
        }
    });

    mirror
}

/// Lists every object of kind `K` once and enqueues all of their keys. Used
/// both at startup (before the first watch event arrives, so a crash
/// mid-reconcile is picked back up) and on the resync timer, so the resync
/// period self-heals from any watch event the controller missed.
pub async fn enqueue_all<K, F>(api: &Api<K>, queue: &WorkQueue<String>, key_of: F)
where
    K: Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    F: Fn(&K) -> String,
{
    match api.list(&Default::default()).await {
        Ok(list) => {
            for obj in &list.items {
                queue.add(key_of(obj)).await;
            }
        }
        Err(e) => tracing::warn!(error = %e, "resync list failed"),
    }
}
