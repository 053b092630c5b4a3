//! Wires the reconcilers in `crate::reconcile` to a live cluster: starts a
//! watcher/reflector pair per resource kind (feeding both the `Mirror` cache
//! and the corresponding `WorkQueue`), spawns the configured number of
//! worker tasks per kind, and runs a periodic resync sweep so a missed watch
//! event is eventually self-healed.
//!
//! Multi-replica deployments gate all of the above behind leader election
//! (`controller::leader`) so only one replica is actively reconciling.

mod leader;
mod watch;

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::Api;
use kube::Client;

use crate::api_ops::KubeApiOps;
use crate::clients::Clients;
use crate::config::RuntimeConfig;
use crate::crd::{
    GroupSnapshot, GroupSnapshotClass, GroupSnapshotContent, VolumeSnapshot, VolumeSnapshotClass,
    VolumeSnapshotContent,
};
use crate::error::Result;
use crate::queue::WorkQueue;
use crate::reconcile::{self, Outcome};
use crate::util;

/// Shared state threaded from `main` into the controller loop.
pub struct ControllerState {
    pub client: Client,
    pub config: RuntimeConfig,
}

pub async fn run_controller(state: Arc<ControllerState>) -> Result<()> {
    let client = state.client.clone();
    let config = state.config.clone();
    let clients = build_clients(client.clone(), &config);

    if config.leader_election {
        let identity = candidate_identity();
        tracing::info!(identity, "leader election enabled, attempting to acquire lease");
        let mut leader_rx = leader::spawn(
            client.clone(),
            config.leader_election_namespace.clone(),
            "snapshot-controller-leader".to_string(),
            identity,
            Duration::from_secs(15),
        );
        leader_rx
            .wait_for(|held| *held)
            .await
            .map_err(|_| crate::error::Error::Config("leader election channel closed".into()))?;
        tracing::info!("acquired leader lease");
    }

    run_reconciliation(client, clients, config).await;
    Ok(())
}

/// Builds the `ApiOps` handles and work queues every reconciler shares.
fn build_clients(client: Client, _config: &RuntimeConfig) -> Clients {
    Clients {
        client: client.clone(),
        snapshots: Arc::new(KubeApiOps::<VolumeSnapshot>::new(client.clone())),
        contents: Arc::new(KubeApiOps::<VolumeSnapshotContent>::new(client.clone())),
        classes: Arc::new(KubeApiOps::<VolumeSnapshotClass>::new(client.clone())),
        pvcs: Arc::new(KubeApiOps::<PersistentVolumeClaim>::new(client.clone())),
        pvs: Arc::new(KubeApiOps::<PersistentVolume>::new(client.clone())),
        groups: Arc::new(KubeApiOps::<GroupSnapshot>::new(client.clone())),
        group_contents: Arc::new(KubeApiOps::<GroupSnapshotContent>::new(client.clone())),
        group_classes: Arc::new(KubeApiOps::<GroupSnapshotClass>::new(client.clone())),
        snapshot_queue: WorkQueue::new(),
        content_queue: WorkQueue::new(),
        group_queue: WorkQueue::new(),
        group_content_queue: WorkQueue::new(),
    }
}

async fn run_reconciliation(client: Client, clients: Clients, config: RuntimeConfig) {
    let snapshots_api: Api<VolumeSnapshot> = Api::all(client.clone());
    let contents_api: Api<VolumeSnapshotContent> = Api::all(client.clone());

    let _snapshot_mirror = watch::spawn(snapshots_api.clone(), clients.snapshot_queue.clone(), |s| {
        util::namespaced_key(
            s.metadata.namespace.as_deref().unwrap_or_default(),
            s.metadata.name.as_deref().unwrap_or_default(),
        )
    });
    let _content_mirror = watch::spawn(contents_api.clone(), clients.content_queue.clone(), |c| {
        util::cluster_key(c.metadata.name.as_deref().unwrap_or_default())
    });

    if config.enable_volume_group_snapshots {
        spawn_group_watchers(client.clone(), &clients);
    }

    watch::enqueue_all(&snapshots_api, &clients.snapshot_queue, |s| {
        util::namespaced_key(
            s.metadata.namespace.as_deref().unwrap_or_default(),
            s.metadata.name.as_deref().unwrap_or_default(),
        )
    })
    .await;
    watch::enqueue_all(&contents_api, &clients.content_queue, |c| {
        util::cluster_key(c.metadata.name.as_deref().unwrap_or_default())
    })
    .await;

    spawn_snapshot_workers(clients.clone(), config.snapshot_workers);
    spawn_content_workers(clients.clone(), config.content_workers);
    if config.enable_volume_group_snapshots {
        spawn_group_workers(clients.clone(), config.group_workers);
    }
    spawn_resync_loop(client, clients, config);

    // Runs until the process is terminated; the workers above are the real
    // long-lived tasks.
    std::future::pending::<()>().await;
}

#[cfg(feature = "group-snapshots")]
fn spawn_group_watchers(client: Client, clients: &Clients) {
    let groups_api: Api<GroupSnapshot> = Api::all(client.clone());
    let group_contents_api: Api<GroupSnapshotContent> = Api::all(client);
    let _group_mirror = watch::spawn(groups_api, clients.group_queue.clone(), |g| {
        util::namespaced_key(
            g.metadata.namespace.as_deref().unwrap_or_default(),
            g.metadata.name.as_deref().unwrap_or_default(),
        )
    });
    let _group_content_mirror =
        watch::spawn(group_contents_api, clients.group_content_queue.clone(), |c| {
            util::cluster_key(c.metadata.name.as_deref().unwrap_or_default())
        });
}

#[cfg(not(feature = "group-snapshots"))]
fn spawn_group_watchers(_client: Client, _clients: &Clients) {}

#[cfg(feature = "group-snapshots")]
fn spawn_group_workers(clients: Clients, n: usize) {
    for _ in 0..n {
        let clients = clients.clone();
        tokio::spawn(async move {
            while let Some(key) = clients.group_queue.get().await {
                let (namespace, name) = split_namespaced_key(&key);
                let result = reconcile::group::reconcile(&clients, &namespace, &name).await;
                finish(&clients.group_queue, "GroupSnapshot", &key, result).await;
            }
        });
    }
    let clients = clients.clone();
    tokio::spawn(async move {
        loop {
            let key = match clients.group_content_queue.get().await {
                Some(k) => k,
                None => return,
            };
            let result = reconcile::group_content::reconcile(&clients, &key).await;
            finish(&clients.group_content_queue, "GroupSnapshotContent", &key, result).await;
        }
    });
}

#[cfg(not(feature = "group-snapshots"))]
fn spawn_group_workers(_clients: Clients, _n: usize) {}

fn spawn_snapshot_workers(clients: Clients, n: usize) {
    for _ in 0..n {
        let clients = clients.clone();
        tokio::spawn(async move {
            while let Some(key) = clients.snapshot_queue.get().await {
                let (namespace, name) = split_namespaced_key(&key);
                let result = reconcile::snapshot::reconcile(&clients, &namespace, &name).await;
                finish(&clients.snapshot_queue, "VolumeSnapshot", &key, result).await;
            }
        });
    }
}

fn spawn_content_workers(clients: Clients, n: usize) {
    for _ in 0..n {
        let clients = clients.clone();
        tokio::spawn(async move {
            while let Some(key) = clients.content_queue.get().await {
                let result = reconcile::content::reconcile(&clients, &key).await;
                finish(&clients.content_queue, "VolumeSnapshotContent", &key, result).await;
            }
        });
    }
}

/// Common post-reconcile bookkeeping: metrics, backoff, `done()`. Shared by
/// every worker loop above: forget on success, rate-limited re-add on error
/// or explicit requeue.
async fn finish(
    queue: &WorkQueue<String>,
    kind: &str,
    key: &str,
    result: crate::error::Result<Outcome>,
) {
    match result {
        Ok(Outcome::Synced) => {
            queue.forget(&key.to_string()).await;
            crate::metrics::record_reconcile(kind, "success");
        }
        Ok(Outcome::Requeue) => {
            queue.add_rate_limited(key.to_string());
        }
        Err(e) => {
            if !e.is_transient() {
                tracing::warn!(error = %e, kind, key, "reconcile failed");
            }
            crate::metrics::record_reconcile(kind, "error");
            queue.add_rate_limited(key.to_string());
        }
    }
    queue.done(&key.to_string()).await;
    crate::metrics::set_queue_depth(kind, queue.len().await as i64);
}

fn spawn_resync_loop(client: Client, clients: Clients, config: RuntimeConfig) {
    tokio::spawn(async move {
        let snapshots_api: Api<VolumeSnapshot> = Api::all(client.clone());
        let contents_api: Api<VolumeSnapshotContent> = Api::all(client.clone());
        let groups_api: Api<GroupSnapshot> = Api::all(client.clone());
        let group_contents_api: Api<GroupSnapshotContent> = Api::all(client);
        loop {
            tokio::time::sleep(config.resync_period).await;
            tracing::debug!("running periodic resync");
            watch::enqueue_all(&snapshots_api, &clients.snapshot_queue, |s| {
                util::namespaced_key(
                    s.metadata.namespace.as_deref().unwrap_or_default(),
                    s.metadata.name.as_deref().unwrap_or_default(),
                )
            })
            .await;
            watch::enqueue_all(&contents_api, &clients.content_queue, |c| {
                util::cluster_key(c.metadata.name.as_deref().unwrap_or_default())
            })
            .await;
            if config.enable_volume_group_snapshots {
                watch::enqueue_all(&groups_api, &clients.group_queue, |g| {
                    util::namespaced_key(
                        g.metadata.namespace.as_deref().unwrap_or_default(),
                        g.metadata.name.as_deref().unwrap_or_default(),
                    )
                })
                .await;
                watch::enqueue_all(&group_contents_api, &clients.group_content_queue, |c| {
                    util::cluster_key(c.metadata.name.as_deref().unwrap_or_default())
                })
                .await;
            }
        }
    });
}

fn split_namespaced_key(key: &str) -> (String, String) {
    match key.split_once('/') {
        Some((ns, name)) => (ns.to_string(), name.to_string()),
        None => (String::new(), key.to_string()),
    }
}

fn candidate_identity() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "snapshot-controller".to_string());
    let pod = std::env::var("POD_NAME").unwrap_or_default();
    if pod.is_empty() {
        host
    } else {
        pod
    }
}
