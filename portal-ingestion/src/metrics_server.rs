//! Prometheus scrape endpoint for the ingestion counters.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;

/// Install the global recorder and serve `GET /metrics` on `bind_addr`.
///
/// Returns the bound address; the server itself runs on a spawned task.
pub async fn serve(bind_addr: &str) -> anyhow::Result<SocketAddr> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus metrics recorder")?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("cannot bind metrics listener on {bind_addr:?}"))?;
    spawn(listener, handle)
}

fn spawn(listener: TcpListener, handle: PrometheusHandle) -> anyhow::Result<SocketAddr> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "serving metrics");

    let app = Router::new().route("/metrics", get(render)).with_state(handle);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics server error");
        }
    });
    Ok(addr)
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
