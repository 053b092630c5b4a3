//! `snapshot-controller` entry point.
//!
//! Parses CLI flags into a `RuntimeConfig`, wires up tracing (with optional
//! OTLP export), builds the Kubernetes client, and starts the controller
//! loop alongside the optional REST API server.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use snapshot_controller::config::{Cli, RuntimeConfig};
use snapshot_controller::controller::{self, ControllerState};
use snapshot_controller::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let cli = Cli::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);

    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();

    if cli.log_json {
        let fmt_layer = fmt::layer().json().with_target(true);
        if otel_enabled {
            let otel_layer = snapshot_controller::telemetry::init_telemetry(&registry);
            registry.with(fmt_layer).with(otel_layer).init();
        } else {
            registry.with(fmt_layer).init();
        }
    } else {
        let fmt_layer = fmt::layer().with_target(true);
        if otel_enabled {
            let otel_layer = snapshot_controller::telemetry::init_telemetry(&registry);
            registry.with(fmt_layer).with(otel_layer).init();
        } else {
            registry.with(fmt_layer).init();
        }
    }

    if otel_enabled {
        info!("OpenTelemetry tracing initialized");
    } else {
        info!("OpenTelemetry tracing disabled (OTEL_EXPORTER_OTLP_ENDPOINT not set)");
    }

    info!(
        "starting snapshot-controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default().await.map_err(Error::Kube)?;
    info!("connected to Kubernetes cluster");

    let config = RuntimeConfig::from(&cli);
    let state = Arc::new(ControllerState { client, config });

    #[cfg(feature = "rest-api")]
    {
        let api_state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = snapshot_controller::rest_api::run_server(api_state).await {
                tracing::error!(error = %e, "REST API server error");
            }
        });
    }

    let result = controller::run_controller(state).await;

    snapshot_controller::telemetry::shutdown_telemetry();

    result
}
