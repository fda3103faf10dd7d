//! WebSocket connection state machine.
//!
//! One task per connection: register on open, greet, then loop over
//! inbound frames and queued outbound frames until the peer leaves or the
//! server stops. Every exit path unregisters, which also raises the
//! connection's cancellation flag for any query still running.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket};
use futures_util::{SinkExt, StreamExt};

use super::messages::{ClientRequest, GREETING, QueryResponse};
use crate::app_state::AppState;
use crate::domain::{Connection, RangeQuery};
use crate::service::{Downsampler, QueryError};

/// Runs the open/message/close protocol for a single WebSocket connection.
pub async fn run_connection(socket: WebSocket, remote: SocketAddr, state: AppState) {
    let (conn, mut out_rx) = Connection::new(
        remote.to_string(),
        state.shutdown.child_token(),
        state.config.outbound_buffer,
    );
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let shutdown = state.shutdown.clone();

    state.registry.register(Arc::clone(&conn));
    tracing::info!(%conn_id, %remote, "new websocket connection");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut open = ws_tx
        .send(Message::Text(Utf8Bytes::from_static(GREETING)))
        .await
        .is_ok();

    while open {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_frame(text.as_str().as_bytes(), &conn, &state);
                    }
                    Some(Ok(Message::Binary(data))) => handle_frame(&data, &conn, &state),
                    Some(Ok(Message::Close(_))) | None => open = false,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(%conn_id, error = %err, "websocket transport error");
                        open = false;
                    }
                }
            }
            frame = out_rx.recv() => {
                match frame {
                    Some(frame) => {
                        open = ws_tx.send(Message::text(frame.to_string())).await.is_ok();
                    }
                    None => open = false,
                }
            }
            () = shutdown.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                open = false;
            }
        }
    }

    let _ = state.registry.unregister(conn_id);
    let open_for = chrono::Utc::now() - conn.connected_at();
    tracing::info!(
        %conn_id,
        %remote,
        open_ms = open_for.num_milliseconds(),
        dropped_frames = conn.dropped_frames(),
        "websocket connection closed"
    );
}

/// Routes one inbound frame. Anything that does not parse is dropped.
fn handle_frame(raw: &[u8], conn: &Arc<Connection>, state: &AppState) {
    match ClientRequest::parse(raw) {
        Ok(ClientRequest::GetDownsampledInRange(query)) => {
            spawn_query(query, Arc::clone(conn), Arc::clone(&state.downsampler));
        }
        Err(err) => {
            tracing::debug!(conn_id = %conn.id(), error = %err, "ignoring websocket message");
        }
    }
}

/// Answers a range query off the connection task.
///
/// The engine runs on a blocking thread and polls the connection's
/// token; a cancelled query sends nothing.
fn spawn_query(query: RangeQuery, conn: Arc<Connection>, downsampler: Arc<dyn Downsampler>) {
    tokio::spawn(async move {
        let cancel = conn.cancellation_token();
        let engine_cancel = cancel.clone();
        let result =
            tokio::task::spawn_blocking(move || downsampler.downsample(&query, &engine_cancel))
                .await;

        let samples = match result {
            Ok(Ok(samples)) => samples,
            Ok(Err(QueryError::Cancelled)) => {
                tracing::debug!(conn_id = %conn.id(), "range query cancelled");
                return;
            }
            Ok(Err(err)) => {
                tracing::warn!(conn_id = %conn.id(), error = %err, "range query failed");
                return;
            }
            Err(err) => {
                tracing::warn!(conn_id = %conn.id(), error = %err, "range query task aborted");
                return;
            }
        };
        if cancel.is_cancelled() {
            return;
        }

        let reply = match serde_json::to_string(&QueryResponse::new(&query, &samples)) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::warn!(conn_id = %conn.id(), error = %err, "failed to serialize reply");
                return;
            }
        };
        if conn.send(reply).await {
            tracing::debug!(
                conn_id = %conn.id(),
                samples = samples.len(),
                "range query served"
            );
        }
    });
}
