//! Lobby server: WebSocket ingress, the text-command dispatcher, and the
//! admin reporting loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        ConnectInfo, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};

use crate::common::shutdown::shutdown_signal;
use crate::lobby::proto;
use crate::lobby::room::{
    FrameAction, Player, PlayerId, ROOM_CAPACITY, ROOM_COUNT, Room, RoomState,
};

/// Interval between STATS/ROOM_LIST reports sent to an admin session.
const ADMIN_REPORT_PERIOD: Duration = Duration::from_secs(5);

/// Shared lobby state: the fixed room set and the player id counter.
pub struct LobbyState {
    rooms: Vec<Mutex<Room>>,
    next_player_id: AtomicU32,
}

impl LobbyState {
    pub fn new() -> Self {
        Self {
            rooms: (1..=ROOM_COUNT).map(|id| Mutex::new(Room::new(id))).collect(),
            next_player_id: AtomicU32::new(1),
        }
    }

    fn next_player_id(&self) -> PlayerId {
        self.next_player_id.fetch_add(1, Ordering::Relaxed)
    }

    /// The room with the given 1-based id.
    fn room(&self, id: u8) -> Option<&Mutex<Room>> {
        self.rooms.get((id as usize).checked_sub(1)?)
    }

    /// Find the room currently holding `player_id`. A player is in at most
    /// one room, so the first hit wins. Locks one room at a time.
    async fn locate_player(&self, player_id: PlayerId) -> Option<&Mutex<Room>> {
        for room in &self.rooms {
            if room.lock().await.contains(player_id) {
                return Some(room);
            }
        }
        None
    }
}

impl Default for LobbyState {
    fn default() -> Self {
        Self::new()
    }
}

pub fn router(state: Arc<LobbyState>) -> Router {
    Router::new().route("/", get(ws_handler)).with_state(state)
}

/// Run the lobby server until ctrl-c.
///
/// # Arguments
///
/// * `host` - the address to bind to (e.g. "0.0.0.0")
/// * `port` - the port to bind to (e.g. 8080)
pub async fn run_lobby_server(host: &str, port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(LobbyState::new());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("lobby server listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("lobby server shut down");
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<LobbyState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, addr))
}

async fn handle_connection(socket: WebSocket, state: Arc<LobbyState>, addr: SocketAddr) {
    let player_id = state.next_player_id();
    tracing::info!("client {} connected from {}", player_id, addr);

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Single writer per socket; every other task queues through `tx`.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    let session = Session {
        state: state.clone(),
        player_id,
        addr,
        tx: tx.clone(),
    };
    session.send(proto::your_id(player_id));

    let mut read_task = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => session.dispatch(text.as_str()).await,
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => write_task.abort(),
        _ = &mut write_task => read_task.abort(),
    }

    // The player may still occupy a room; evict it and tell the others.
    remove_from_any_room(&state, player_id).await;
    tracing::info!("client {} disconnected", player_id);
}

async fn remove_from_any_room(state: &LobbyState, player_id: PlayerId) {
    let Some(room_mutex) = state.locate_player(player_id).await else {
        return;
    };
    let mut room = room_mutex.lock().await;
    let Some(player) = room.remove_player(player_id) else {
        return;
    };
    tracing::info!("player {} removed from room {}", player_id, room.id);
    room.broadcast_all(&proto::chat(player.id, &player.name, "left the Room."));
    room.broadcast_all(&proto::player_list(&room));
    release_if_ready(&mut room);
}

/// A departure or buffered frame may have completed the quota; push out
/// whatever the synchronizer released.
fn release_if_ready(room: &mut Room) {
    if let Some(schedule) = room.evaluate_sync() {
        tracing::info!(
            "room {} synchronized, releasing {} buffered frames",
            room.id,
            schedule.len()
        );
        for (sender_id, frame) in schedule {
            room.broadcast_except(sender_id, &frame);
        }
    }
}

/// Per-connection context handed to every command handler.
struct Session {
    state: Arc<LobbyState>,
    player_id: PlayerId,
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<String>,
}

impl Session {
    fn send(&self, msg: String) {
        if self.tx.send(msg).is_err() {
            tracing::debug!("player {} channel closed", self.player_id);
        }
    }

    async fn dispatch(&self, text: &str) {
        let parts: Vec<&str> = text.split('\n').collect();
        let command = parts[0];
        if command != "FRAME" {
            tracing::debug!("received from {}: {}", self.player_id, text);
        }
        match command {
            "LIST" => self.handle_list().await,
            "JOIN" => self.handle_join(&parts).await,
            "LEAVE" => self.handle_leave(&parts).await,
            "START" => self.handle_start().await,
            "CHAT" => self.handle_chat(&parts).await,
            "FRAME" => self.handle_frame(text).await,
            "ADMIN" => self.handle_admin(),
            "CHANGE_LATENCY" => self.handle_change_latency(&parts).await,
            "AWAY" | "UPDATE_CONTROL_NAMES" => self.relay_to_others(text).await,
            _ => tracing::warn!(
                "unknown command from player {}: {}",
                self.player_id,
                command
            ),
        }
    }

    async fn handle_list(&self) {
        let mut listing = String::from("LIST\n\n");
        for room_mutex in &self.state.rooms {
            let room = room_mutex.lock().await;
            proto::append_room_summary(&mut listing, &room);
        }
        self.send(listing);
    }

    async fn handle_join(&self, parts: &[&str]) {
        if parts.len() < 8 {
            tracing::warn!("invalid JOIN command from player {}", self.player_id);
            return;
        }
        let Some(room_mutex) = parts[1].parse::<u8>().ok().and_then(|id| self.state.room(id))
        else {
            tracing::warn!(
                "invalid room id from player {}: {}",
                self.player_id,
                parts[1]
            );
            return;
        };
        if self.state.locate_player(self.player_id).await.is_some() {
            tracing::warn!(
                "player {} tried to join a room while already in one",
                self.player_id
            );
            return;
        }

        let mut room = room_mutex.lock().await;
        if room.state == RoomState::Started {
            tracing::warn!(
                "player {} tried to join started room {}",
                self.player_id,
                room.id
            );
            return;
        }
        if room.player_count() >= ROOM_CAPACITY {
            tracing::warn!("room {} is full", room.id);
            return;
        }

        let player = Player {
            id: self.player_id,
            name: parts[2].to_string(),
            addr: self.addr,
            p1: parts[3].to_string(),
            p2: parts[4].to_string(),
            p3: parts[5].to_string(),
            p4: parts[6].to_string(),
            achievements: parts[7].to_string(),
            sender: self.tx.clone(),
        };
        tracing::info!("player {} ({}) joined room {}", player.id, player.name, room.id);
        room.add_player(player);
        room.broadcast_all(&proto::player_list(&room));
    }

    async fn handle_leave(&self, parts: &[&str]) {
        if parts.len() < 2 {
            tracing::warn!("invalid LEAVE command from player {}", self.player_id);
            return;
        }
        let Some(room_mutex) = parts[1].parse::<u8>().ok().and_then(|id| self.state.room(id))
        else {
            tracing::warn!(
                "invalid room id from player {}: {}",
                self.player_id,
                parts[1]
            );
            return;
        };
        let mut room = room_mutex.lock().await;
        if room.remove_player(self.player_id).is_none() {
            tracing::warn!("player {} is not in room {}", self.player_id, room.id);
            return;
        }
        tracing::info!("player {} left room {}", self.player_id, room.id);
        self.send(proto::left_room(room.id));
        room.broadcast_all(&proto::player_list(&room));
        release_if_ready(&mut room);
    }

    async fn handle_start(&self) {
        let Some(room_mutex) = self.state.locate_player(self.player_id).await else {
            tracing::warn!("player {} is not in any room", self.player_id);
            return;
        };
        let mut room = room_mutex.lock().await;
        if room.state == RoomState::Started {
            tracing::debug!("room {} is already started", room.id);
            return;
        }
        tracing::info!(
            "room {} started by player {}, synchronizing",
            room.id,
            self.player_id
        );
        // A lone member or a zero latency is ready before any frame arrives.
        if room.start().is_some() {
            tracing::info!("room {} synchronized immediately", room.id);
        }
        room.broadcast_all(&proto::room_now_started(room.id, room.age_millis()));
    }

    async fn handle_chat(&self, parts: &[&str]) {
        if parts.len() < 2 {
            tracing::warn!("invalid CHAT command from player {}", self.player_id);
            return;
        }
        let Some(room_mutex) = self.state.locate_player(self.player_id).await else {
            tracing::warn!("player {} is not in any room", self.player_id);
            return;
        };
        let room = room_mutex.lock().await;
        let Some(player) = room.player(self.player_id) else {
            return;
        };
        room.broadcast_all(&proto::chat(player.id, &player.name, parts[1]));
    }

    async fn handle_frame(&self, raw: &str) {
        let Some(room_mutex) = self.state.locate_player(self.player_id).await else {
            // Leftover frame from a player that already left; drop quietly.
            return;
        };
        let mut room = room_mutex.lock().await;
        if room.state != RoomState::Started {
            return;
        }
        match room.accept_frame(self.player_id, raw.to_string()) {
            FrameAction::Relay => room.broadcast_except(self.player_id, raw),
            FrameAction::Buffered => {}
            FrameAction::Release(schedule) => {
                tracing::info!(
                    "room {} synchronized, releasing {} buffered frames",
                    room.id,
                    schedule.len()
                );
                for (sender_id, frame) in schedule {
                    room.broadcast_except(sender_id, &frame);
                }
            }
        }
    }

    /// AWAY and UPDATE_CONTROL_NAMES pass through verbatim to the rest of
    /// the room.
    async fn relay_to_others(&self, raw: &str) {
        let Some(room_mutex) = self.state.locate_player(self.player_id).await else {
            tracing::warn!("player {} is not in any room", self.player_id);
            return;
        };
        let room = room_mutex.lock().await;
        room.broadcast_except(self.player_id, raw);
    }

    fn handle_admin(&self) {
        tracing::info!("admin connected: {}", self.player_id);
        let state = self.state.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(ADMIN_REPORT_PERIOD).await;
                if tx.send(proto::admin_stats().to_string()).is_err() {
                    break;
                }
                let mut report = String::from("ROOM_LIST\n");
                for room_mutex in &state.rooms {
                    let room = room_mutex.lock().await;
                    proto::append_admin_room_line(&mut report, &room);
                }
                if tx.send(report).is_err() {
                    break;
                }
            }
        });
    }

    async fn handle_change_latency(&self, parts: &[&str]) {
        if parts.len() < 2 {
            tracing::warn!(
                "invalid CHANGE_LATENCY command from player {}",
                self.player_id
            );
            return;
        }
        let Ok(latency) = parts[1].parse::<usize>() else {
            tracing::warn!(
                "invalid latency from player {}: {}",
                self.player_id,
                parts[1]
            );
            return;
        };
        let Some(room_mutex) = self.state.locate_player(self.player_id).await else {
            tracing::warn!("player {} is not in any room", self.player_id);
            return;
        };
        let mut room = room_mutex.lock().await;
        room.latency = latency;
        tracing::info!(
            "room {} latency changed to {} by player {}",
            room.id,
            latency,
            self.player_id
        );
        room.broadcast_all(&proto::player_list(&room));
    }
}
