//! Relay client, run next to the game server (host mode) or next to a game
//! client (peer mode).
//!
//! Host mode keeps a control connection to the relay and opens one data
//! WebSocket per announced peer, bridging each to a fresh TCP connection to
//! the local game server. Peer mode listens on a local TCP port and tunnels
//! every accepted connection through its own WebSocket.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::relay::proto::ControlMessage;
use crate::relay::socket::{PONG_WAIT, WRITE_WAIT};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Scratch size for draining the TCP side of a bridge.
const TCP_READ_BUF: usize = 2048;

#[derive(Debug, Error)]
pub enum RelayClientError {
    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("relay control connection lost: {0}")]
    ControlLost(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings for host mode.
pub struct HostConfig {
    /// Relay server address; scheme optional.
    pub server: String,
    /// Relay room shared with the peers.
    pub room: String,
    /// Local game server to forward peer traffic to.
    pub game_addr: String,
}

/// Settings for peer mode.
pub struct PeerConfig {
    pub server: String,
    pub room: String,
    /// Local address game clients connect to.
    pub listen_addr: String,
}

/// Build the WebSocket URL for a relay endpoint. `http` and `https` are
/// accepted as aliases for `ws` and `wss`; a schemeless address gets `ws`.
pub fn websocket_url(server: &str, path: &str, room: &str) -> String {
    let base = if let Some(rest) = server.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = server.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if server.starts_with("ws://") || server.starts_with("wss://") {
        server.to_string()
    } else {
        format!("ws://{server}")
    };
    format!("{}{path}?room={room}", base.trim_end_matches('/'))
}

/// Run host mode: register on the relay's control channel and serve data
/// channels until the control connection dies.
pub async fn run_host(config: HostConfig) -> Result<(), RelayClientError> {
    let url = websocket_url(&config.server, "/ws-host", &config.room);
    tracing::info!("host mode, control connection to {}", url);

    let (stream, _response) = connect_async(url.as_str()).await?;
    let (mut write, mut read) = stream.split();

    write
        .send(Message::Text(ControlMessage::RegisterHost.encode().into()))
        .await?;
    tracing::info!("registered as host, waiting for peer notifications");

    loop {
        let frame = match tokio::time::timeout(PONG_WAIT, read.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => return Err(RelayClientError::ControlLost(e.to_string())),
            Ok(None) => return Err(RelayClientError::ControlLost("connection closed".into())),
            Err(_) => {
                return Err(RelayClientError::ControlLost(
                    "heartbeat deadline expired".into(),
                ));
            }
        };
        let Message::Text(text) = frame else {
            continue;
        };
        let message = match ControlMessage::decode(text.as_str()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("malformed control message: {e}");
                continue;
            }
        };
        match message {
            ControlMessage::NewPeer { peer_id } => {
                tracing::info!("new peer announced: {}", peer_id);
                let url = websocket_url(&config.server, "/ws-host", &config.room);
                let game_addr = config.game_addr.clone();
                tokio::spawn(async move {
                    if let Err(e) = open_data_channel(url, game_addr, &peer_id).await {
                        tracing::warn!("data channel for {} failed: {e}", peer_id);
                    }
                });
            }
            ControlMessage::Ping => {
                let pong = Message::Text(ControlMessage::Pong.encode().into());
                match tokio::time::timeout(WRITE_WAIT, write.send(pong)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => return Err(RelayClientError::ControlLost(e.to_string())),
                    Err(_) => {
                        return Err(RelayClientError::ControlLost("pong write timed out".into()));
                    }
                }
            }
            other => tracing::debug!("ignoring control message: {:?}", other),
        }
    }
}

/// Open the data side of one peer's channel and bridge it to a fresh TCP
/// connection to the game server.
async fn open_data_channel(
    url: String,
    game_addr: String,
    peer_id: &str,
) -> Result<(), RelayClientError> {
    tracing::info!("[{}] opening data channel", peer_id);
    let (mut ws, _response) = connect_async(url.as_str()).await?;
    let hello = ControlMessage::DataConn {
        peer_id: peer_id.to_string(),
    };
    ws.send(Message::Text(hello.encode().into())).await?;

    let game = TcpStream::connect(&game_addr).await?;
    tracing::info!("[{}] bridging relay and game server at {}", peer_id, game_addr);
    bridge(ws, game).await;
    tracing::info!("[{}] data channel closed", peer_id);
    Ok(())
}

/// Run peer mode: accept local game clients and tunnel each through its own
/// WebSocket.
pub async fn run_peer(config: PeerConfig) -> Result<(), RelayClientError> {
    let listener = TcpListener::bind(&config.listen_addr).await?;
    tracing::info!("peer mode, waiting for game clients on {}", config.listen_addr);

    loop {
        let (game, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!("failed to accept game connection: {e}");
                continue;
            }
        };
        tracing::info!("accepted game client {}", addr);
        let url = websocket_url(&config.server, "/ws-peer", &config.room);
        tokio::spawn(async move {
            match connect_async(url.as_str()).await {
                Ok((ws, _response)) => {
                    bridge(ws, game).await;
                    tracing::info!("tunnel for {} closed", addr);
                }
                Err(e) => tracing::warn!("failed to reach relay: {e}"),
            }
        });
    }
}

/// Shuttle bytes between a relay WebSocket and a local TCP stream until
/// either side fails. One loop owns both sockets, so writes never race;
/// binary frames are game bytes, text frames are heartbeat control.
async fn bridge(ws: WsStream, mut tcp: TcpStream) {
    let (mut ws_write, mut ws_read) = ws.split();
    let (mut tcp_read, mut tcp_write) = tcp.split();
    let mut buf = [0u8; TCP_READ_BUF];

    loop {
        tokio::select! {
            read = tcp_read.read(&mut buf) => match read {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let frame = Message::Binary(buf[..n].to_vec().into());
                    match tokio::time::timeout(WRITE_WAIT, ws_write.send(frame)).await {
                        Ok(Ok(())) => {}
                        _ => break,
                    }
                }
            },
            frame = tokio::time::timeout(PONG_WAIT, ws_read.next()) => match frame {
                Ok(Some(Ok(Message::Binary(data)))) => {
                    if tcp_write.write_all(&data).await.is_err() {
                        break;
                    }
                }
                Ok(Some(Ok(Message::Text(text)))) => {
                    if matches!(
                        ControlMessage::decode(text.as_str()),
                        Ok(ControlMessage::Ping)
                    ) {
                        let pong = Message::Text(ControlMessage::Pong.encode().into());
                        match tokio::time::timeout(WRITE_WAIT, ws_write.send(pong)).await {
                            Ok(Ok(())) => {}
                            _ => break,
                        }
                    }
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(Some(Err(_))) | Ok(None) => break,
                Ok(Some(Ok(_))) => {}
                Err(_) => break,
            },
        }
    }

    let _ = ws_write.close().await;
}
