//! Relay ingress: classifies each upgraded socket by its first control
//! frame and cross-wires paired channels.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use futures_util::StreamExt;
use serde::Deserialize;

use crate::common::shutdown::shutdown_signal;
use crate::relay::proto::ControlMessage;
use crate::relay::registry::{PendingPeer, RelayRegistry, SocketReader};
use crate::relay::socket::{PONG_WAIT, SharedWriter, heartbeat};

#[derive(Debug, Deserialize)]
struct RoomQuery {
    #[serde(default)]
    room: String,
}

pub fn router(registry: Arc<RelayRegistry>) -> Router {
    Router::new()
        .route("/ws-host", get(host_handler))
        .route("/ws-peer", get(peer_handler))
        .with_state(registry)
}

/// Run the relay server until ctrl-c.
///
/// # Arguments
///
/// * `host` - the address to bind to (e.g. "0.0.0.0")
/// * `port` - the port to bind to (e.g. 28080)
pub async fn run_relay_server(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(RelayRegistry::new());
    let app = router(registry);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("relay server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("relay server shut down");
    Ok(())
}

async fn host_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<RelayRegistry>>,
    Query(query): Query<RoomQuery>,
) -> Response {
    if query.room.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    ws.on_upgrade(move |socket| handle_host(socket, registry, query.room))
        .into_response()
}

async fn peer_handler(
    ws: WebSocketUpgrade,
    State(registry): State<Arc<RelayRegistry>>,
    Query(query): Query<RoomQuery>,
) -> Response {
    if query.room.is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }
    ws.on_upgrade(move |socket| handle_peer(socket, registry, query.room))
        .into_response()
}

/// A socket on `/ws-host` is either the host's control connection or the
/// data side of a pending peer's channel; its first text frame says which.
async fn handle_host(socket: WebSocket, registry: Arc<RelayRegistry>, room_name: String) {
    let (sink, mut reader) = socket.split();
    let writer = SharedWriter::new(sink);

    let Some(first) = read_control(&mut reader).await else {
        writer.close().await;
        return;
    };

    match first {
        ControlMessage::RegisterHost => {
            run_host_control(writer, reader, registry, room_name).await;
        }
        ControlMessage::DataConn { peer_id } => {
            pair_data_conn(writer, reader, registry, room_name, peer_id).await;
        }
        other => {
            tracing::warn!("unexpected first message on host socket: {:?}", other);
            writer.close().await;
        }
    }
}

/// Read one control frame under the read deadline. `None` on close, error,
/// deadline, or a malformed frame.
async fn read_control(reader: &mut SocketReader) -> Option<ControlMessage> {
    let frame = tokio::time::timeout(PONG_WAIT, reader.next()).await.ok()?;
    let message = frame?.ok()?;
    let Message::Text(text) = message else {
        tracing::warn!("expected a text control frame");
        return None;
    };
    match ControlMessage::decode(text.as_str()) {
        Ok(msg) => Some(msg),
        Err(e) => {
            tracing::warn!("malformed control frame: {e}");
            None
        }
    }
}

async fn run_host_control(
    writer: SharedWriter,
    mut reader: SocketReader,
    registry: Arc<RelayRegistry>,
    room_name: String,
) {
    let room = registry.room(&room_name).await;
    if !room.claim_host(writer.clone()).await {
        tracing::warn!("room {} already has a host, rejecting", room_name);
        writer.close().await;
        return;
    }
    tracing::info!("host registered for room {}", room_name);
    tokio::spawn(heartbeat(writer.clone()));

    // The control connection only ever carries pong replies back to us;
    // everything else is logged and ignored.
    loop {
        match tokio::time::timeout(PONG_WAIT, reader.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match ControlMessage::decode(text.as_str()) {
                Ok(ControlMessage::Pong) => {}
                Ok(other) => tracing::debug!("ignoring control frame from host: {:?}", other),
                Err(e) => tracing::debug!("ignoring malformed frame from host: {e}"),
            },
            Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
            Ok(Some(Ok(_))) => {}
            Err(_) => {
                tracing::info!("host for room {} missed its heartbeat deadline", room_name);
                break;
            }
        }
    }

    // The host is gone: every peer still waiting for a data channel is
    // orphaned, and the room disappears once fully empty.
    tracing::info!("host for room {} disconnected", room_name);
    let orphans = room.release_host().await;
    writer.close().await;
    for peer in orphans {
        peer.writer.close().await;
    }
    registry.remove_if_abandoned(&room_name).await;
}

async fn pair_data_conn(
    host_writer: SharedWriter,
    host_reader: SocketReader,
    registry: Arc<RelayRegistry>,
    room_name: String,
    peer_id: String,
) {
    let peer = match registry.get(&room_name).await {
        Some(room) => room.take_pending(&peer_id).await,
        None => None,
    };
    let Some(peer) = peer else {
        tracing::warn!("no pending peer {} in room {}", peer_id, room_name);
        host_writer.close().await;
        return;
    };
    tracing::info!("pairing host data connection with peer {} in room {}", peer_id, room_name);

    tokio::spawn(heartbeat(host_writer.clone()));
    tokio::spawn(heartbeat(peer.writer.clone()));
    tokio::spawn(forward(host_reader, peer.writer.clone(), host_writer.clone()));
    tokio::spawn(forward(peer.reader, host_writer, peer.writer));
}

/// Pump binary frames from `src` to `dst`. Text frames are control traffic
/// (heartbeat replies) and are dropped. Any read or write failure closes
/// both endpoints so the partner forwarder unblocks within one read.
async fn forward(mut src: SocketReader, dst: SharedWriter, src_writer: SharedWriter) {
    loop {
        match tokio::time::timeout(PONG_WAIT, src.next()).await {
            Ok(Some(Ok(Message::Binary(data)))) => {
                if let Err(e) = dst.send_binary(data).await {
                    tracing::debug!("forward write failed: {e}");
                    break;
                }
            }
            Ok(Some(Ok(Message::Text(_)))) => {}
            Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
            Ok(Some(Ok(_))) => {}
            Err(_) => break,
        }
    }
    src_writer.close().await;
    dst.close().await;
}

async fn handle_peer(socket: WebSocket, registry: Arc<RelayRegistry>, room_name: String) {
    let (sink, reader) = socket.split();
    let room = registry.room(&room_name).await;

    let peer = PendingPeer {
        writer: SharedWriter::new(sink),
        reader,
    };
    let (peer_id, host) = match room.add_pending(peer).await {
        Ok(assigned) => assigned,
        Err(rejected) => {
            tracing::warn!("no host in room {}, rejecting peer", room_name);
            rejected.writer.close().await;
            registry.remove_if_abandoned(&room_name).await;
            return;
        }
    };
    tracing::info!("peer {} pending in room {}", peer_id, room_name);

    // Notify with the room lock released; only the host's write lock is
    // held for the send itself.
    let notice = ControlMessage::NewPeer {
        peer_id: peer_id.clone(),
    };
    if let Err(e) = host.send_control(&notice).await {
        tracing::warn!("failed to notify host about peer {}: {e}", peer_id);
        if let Some(peer) = room.take_pending(&peer_id).await {
            peer.writer.close().await;
        }
    }
}
