//! Command-line configuration surface.
//!
//! Thin layer over the reconciliation core: flags are parsed once at
//! startup into a `RuntimeConfig` and shared read-only via `Arc` with every
//! reconciler.

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "snapshot-controller",
    about = "Reconciles VolumeSnapshot and VolumeSnapshotContent bindings"
)]
pub struct Cli {
    /// Number of worker threads reconciling VolumeSnapshot objects.
    #[arg(long, env = "SNAPSHOT_WORKER_THREADS", default_value_t = 10)]
    pub snapshot_workers: usize,

    /// Number of worker threads reconciling VolumeSnapshotContent objects.
    #[arg(long, env = "CONTENT_WORKER_THREADS", default_value_t = 10)]
    pub content_workers: usize,

    /// Number of worker threads reconciling GroupSnapshot objects.
    #[arg(long, env = "GROUP_WORKER_THREADS", default_value_t = 5)]
    pub group_workers: usize,

    /// Resync period: how often every object is re-enqueued even without a
    /// watch event, to self-heal from missed updates.
    #[arg(long, env = "RESYNC_PERIOD_SECONDS", default_value_t = 900)]
    pub resync_period_seconds: u64,

    /// Enable group-snapshot (and group-snapshot-content) reconciliation.
    #[arg(long, env = "ENABLE_VOLUME_GROUP_SNAPSHOTS", default_value_t = false)]
    pub enable_volume_group_snapshots: bool,

    /// Attach a per-node owner label to dynamically provisioned content
    /// objects, for distributed (node-local) snapshotting drivers.
    #[arg(long, env = "ENABLE_DISTRIBUTED_SNAPSHOTTING", default_value_t = false)]
    pub enable_distributed_snapshotting: bool,

    /// Run with leader election so exactly one replica reconciles at a time.
    #[arg(long, env = "LEADER_ELECTION", default_value_t = true)]
    pub leader_election: bool,

    /// Namespace holding the leader-election lease.
    #[arg(long, env = "LEADER_ELECTION_NAMESPACE", default_value = "kube-system")]
    pub leader_election_namespace: String,

    /// Bind address for the /metrics and /healthz HTTP server.
    #[arg(long, env = "METRICS_BIND_ADDRESS", default_value = "0.0.0.0:8080")]
    pub metrics_bind_address: String,

    /// Emit JSON-formatted logs instead of human-readable text.
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

impl Cli {
    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_seconds)
    }
}

/// Shared, read-only runtime configuration derived from `Cli`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub snapshot_workers: usize,
    pub content_workers: usize,
    pub group_workers: usize,
    pub resync_period: Duration,
    pub enable_volume_group_snapshots: bool,
    pub enable_distributed_snapshotting: bool,
    pub leader_election: bool,
    pub leader_election_namespace: String,
    pub metrics_bind_address: String,
}

impl From<&Cli> for RuntimeConfig {
    fn from(cli: &Cli) -> Self {
        RuntimeConfig {
            snapshot_workers: cli.snapshot_workers,
            content_workers: cli.content_workers,
            group_workers: cli.group_workers,
            resync_period: cli.resync_period(),
            enable_volume_group_snapshots: cli.enable_volume_group_snapshots,
            enable_distributed_snapshotting: cli.enable_distributed_snapshotting,
            leader_election: cli.leader_election,
            leader_election_namespace: cli.leader_election_namespace.clone(),
            metrics_bind_address: cli.metrics_bind_address.clone(),
        }
    }
}
