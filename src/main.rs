//! nadi-websocket-node entry point.
//!
//! Stands in for an embedding host: creates one instance, asks it to open
//! the websocket server on the configured port, logs lifecycle events,
//! and tears everything down on Ctrl-C.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use nadi_websocket_node::bridge::{HostBridge, Message};
use nadi_websocket_node::config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config =
        NodeConfig::from_env().map_err(|err| anyhow::anyhow!("invalid configuration: {err}"))?;
    let port = config.default_port;
    tracing::info!(descriptor = HostBridge::descriptor(), port, "starting node");

    let bridge = HostBridge::new(config);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = bridge.init(Arc::new(move |msg: Message| {
        let _ = tx.send(msg);
    }));

    let open = serde_json::json!({ "command": "open_websocket", "port": port });
    let status = bridge.send(&Message::management(serde_json::to_vec(&open)?), handle);
    tracing::debug!(code = status.code(), "open_websocket sent");

    loop {
        tokio::select! {
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                tracing::info!(event = %String::from_utf8_lossy(&msg.data), "server event");
                let failed = serde_json::from_slice::<serde_json::Value>(&msg.data)
                    .is_ok_and(|event| event["event"] == "failed");
                bridge.free(msg);
                if failed {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    let _ = bridge.deinit(handle);
    Ok(())
}
