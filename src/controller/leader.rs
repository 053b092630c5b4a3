//! Lease-based leader election, so exactly one replica of the controller
//! reconciles at a time when run with multiple replicas for availability.
//!
//! Simplified relative to client-go's full leaderelection package: a single
//! background task repeatedly tries to acquire or renew a
//! `coordination.k8s.io/v1` `Lease`, and publishes the current leadership
//! state on a `watch` channel. Callers block on the channel until they
//! become leader; losing the lease is logged but does not forcibly kill
//! in-flight work, since every reconcile in this crate is already safe to
//! run redundantly (idempotent, serialized per key by `WorkQueue`).

use std::time::Duration;

use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use tokio::sync::watch;

const FIELD_MANAGER: &str = "snapshot-controller";

/// Spawns the acquire/renew loop and returns a receiver that reads `true`
/// once this process holds the lease. The loop runs for the lifetime of the
/// process.
pub fn spawn(
    client: Client,
    namespace: String,
    name: String,
    identity: String,
    lease_duration: Duration,
) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        let leases: Api<Lease> = Api::namespaced(client, &namespace);
        let retry_period = lease_duration / 4;
        loop {
            match try_acquire_or_renew(&leases, &name, &identity, lease_duration).await {
                Ok(held) => {
                    if tx.send(held).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, lease = %name, "leader election: lease update failed");
                    let _ = tx.send(false);
                }
            }
            tokio::time::sleep(retry_period).await;
        }
    });
    rx
}

async fn try_acquire_or_renew(
    leases: &Api<Lease>,
    name: &str,
    identity: &str,
    lease_duration: Duration,
) -> kube::Result<bool> {
    let now = MicroTime(chrono::Utc::now());
    match leases.get_opt(name).await? {
        None => {
            let lease = Lease {
                metadata: kube::api::ObjectMeta {
                    name: Some(name.to_string()),
                    ..Default::default()
                },
                spec: Some(LeaseSpec {
                    holder_identity: Some(identity.to_string()),
                    lease_duration_seconds: Some(lease_duration.as_secs() as i32),
                    acquire_time: Some(now.clone()),
                    renew_time: Some(now),
                    lease_transitions: Some(1),
                    ..Default::default()
                }),
            };
            match leases.create(&Default::default(), &lease).await {
                Ok(_) => Ok(true),
                // Someone else created it first in this same tick.
                Err(kube::Error::Api(resp)) if resp.code == 409 => Ok(false),
                Err(e) => Err(e),
            }
        }
        Some(existing) => {
            let spec = existing.spec.clone().unwrap_or_default();
            let held_by_us = spec.holder_identity.as_deref() == Some(identity);
            let expired = spec
                .renew_time
                .as_ref()
                .map(|t| {
                    chrono::Utc::now() - t.0
                        > chrono::Duration::seconds(
                            spec.lease_duration_seconds.unwrap_or(15) as i64
                        )
                })
                .unwrap_or(true);

            if !held_by_us && !expired {
                return Ok(false);
            }

            let transitions = if held_by_us {
                spec.lease_transitions.unwrap_or(0)
            } else {
                spec.lease_transitions.unwrap_or(0) + 1
            };
            let patch = serde_json::json!({
                "spec": {
                    "holderIdentity": identity,
                    "leaseDurationSeconds": lease_duration.as_secs() as i32,
                    "acquireTime": if held_by_us { spec.acquire_time } else { Some(now.clone()) },
                    "renewTime": now,
                    "leaseTransitions": transitions,
                }
            });
            leases
                .patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
                .await?;
            Ok(true)
        }
    }
}
