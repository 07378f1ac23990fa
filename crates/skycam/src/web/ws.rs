//! WebSocket pump loops for the camera and viewer endpoints.
//!
//! Each socket gets one task. Inbound messages are dispatched into the hub;
//! outbound payloads are drained from the connection handle's queue. The
//! queue receiver is dropped when the loop exits, which is what flips the
//! handle to closed everywhere else in the process.

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::relay::{AttachOutcome, ConnectionHandle, Outbound, RelayHub};

/// Handle one camera socket for its whole lifetime.
///
/// When the hub refuses the connection (takeover policy `reject`) the socket
/// is closed immediately. When this connection is superseded the hub drops
/// our handle and the outbound queue goes quiet, but the socket keeps being
/// read: a superseded camera's frames still relay until its transport dies.
pub async fn handle_camera_socket(socket: WebSocket, hub: RelayHub, outbound_buffer: usize) {
    let (handle, mut outbound_rx) = ConnectionHandle::new(outbound_buffer);
    let id = handle.id();

    if hub.attach_camera(handle).await == AttachOutcome::Rejected {
        let mut socket = socket;
        let _ = socket.send(Message::Close(None)).await;
        return;
    }

    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut outbound_open = true;

    loop {
        tokio::select! {
            outbound = outbound_rx.recv(), if outbound_open => {
                match outbound {
                    Some(payload) => {
                        if ws_tx.send(to_ws_message(payload)).await.is_err() {
                            break;
                        }
                    }
                    // Superseded: nothing will be sent to us again, but keep
                    // reading so frames from this socket still broadcast.
                    None => outbound_open = false,
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        hub.handle_camera_text(id, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        hub.handle_camera_frame(id, Bytes::from(data)).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(camera = %id, error = %e, "Camera socket error");
                        break;
                    }
                }
            }
        }
    }

    hub.detach_camera(id).await;
    debug!(camera = %id, "Camera socket task ended");
}

/// Handle one viewer socket for its whole lifetime.
pub async fn handle_viewer_socket(socket: WebSocket, hub: RelayHub, outbound_buffer: usize) {
    let (handle, mut outbound_rx) = ConnectionHandle::new(outbound_buffer);
    let id = handle.id();
    hub.add_viewer(handle).await;

    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(payload) => {
                        if ws_tx.send(to_ws_message(payload)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = ws_rx.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        hub.handle_viewer_text(id, &text).await;
                    }
                    // Viewers do not produce frames.
                    Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Ping(data))) => {
                        let _ = ws_tx.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(viewer = %id, error = %e, "Viewer socket error");
                        break;
                    }
                }
            }
        }
    }

    hub.remove_viewer(id).await;
    debug!(viewer = %id, "Viewer socket task ended");
}

fn to_ws_message(payload: Outbound) -> Message {
    match payload {
        Outbound::Text(text) => Message::Text(text),
        Outbound::Binary(data) => Message::Binary(data.to_vec()),
    }
}
