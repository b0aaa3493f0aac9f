use anyhow::{Context, Result};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use ip_gate::{AppState, build_router, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config()?;
    info!(
        listen_ip = %config.listen.ip,
        listen_port = config.listen.port,
        hardcoded_entries = config.access.hardcoded_ips.len(),
        response_mode = ?config.access.response_mode,
        platform_header = %config.access.platform_header,
        store = config.store.kind(),
        "Configuration loaded"
    );

    let gate = config.build_gate()?;
    let state = AppState {
        gate: Arc::new(gate),
        response_mode: config.access.response_mode,
    };

    let addr = config.listen.socket_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to address {addr}"))?;

    info!(listen_addr = %addr, "IP gate listening");

    axum::serve(
        listener,
        build_router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("HTTP server failed")?;

    Ok(())
}
