//! Room and player model, including the start-of-match frame synchronizer.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::mpsc;

/// Process-wide player identity, assigned at connection accept.
pub type PlayerId = u32;

/// Rooms are a fixed set created at boot and never destroyed.
pub const ROOM_COUNT: u8 = 8;

/// Maximum number of players a room can hold.
pub const ROOM_CAPACITY: usize = 8;

/// Default frame-delay setting for a fresh room.
pub const DEFAULT_LATENCY: usize = 3;

/// A connected player as seen by the room it occupies.
///
/// The `sender` is the only write path to the player's socket: the
/// connection's writer task drains it, so everything funneled through it is
/// serialized without further locking.
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub addr: SocketAddr,
    pub p1: String,
    pub p2: String,
    pub p3: String,
    pub p4: String,
    pub achievements: String,
    pub sender: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    Vacant,
    Lobby,
    Started,
}

impl std::fmt::Display for RoomState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            RoomState::Vacant => "VACANT",
            RoomState::Lobby => "LOBBY",
            RoomState::Started => "STARTED",
        })
    }
}

/// What to do with an inbound frame, decided by the synchronizer.
#[derive(Debug)]
pub enum FrameAction {
    /// Steady state: relay to everyone but the sender right away.
    Relay,
    /// Still synchronizing; the frame was buffered.
    Buffered,
    /// This frame completed every member's quota: synchronization is over
    /// and the listed `(sender, frame)` pairs are released in order.
    Release(Vec<(PlayerId, String)>),
}

/// One lobby room. All mutation happens under the room's mutex, which the
/// caller holds for the full duration of any broadcast fan-out.
pub struct Room {
    pub id: u8,
    pub state: RoomState,
    pub latency: usize,
    created_at: Instant,
    players: BTreeMap<PlayerId, Player>,
    synchronizing: bool,
    sync_buffer: BTreeMap<PlayerId, Vec<String>>,
}

impl Room {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            state: RoomState::Vacant,
            latency: DEFAULT_LATENCY,
            created_at: Instant::now(),
            players: BTreeMap::new(),
            synchronizing: false,
            sync_buffer: BTreeMap::new(),
        }
    }

    /// Milliseconds since the room was created.
    pub fn age_millis(&self) -> u128 {
        self.created_at.elapsed().as_millis()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.contains_key(&id)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Members in iteration order (ascending id, which is join order).
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn is_synchronizing(&self) -> bool {
        self.synchronizing
    }

    pub fn add_player(&mut self, player: Player) {
        self.players.insert(player.id, player);
        if self.state == RoomState::Vacant {
            self.state = RoomState::Lobby;
        }
    }

    /// Remove a member. An emptied room falls back to VACANT and sheds any
    /// in-flight synchronization state.
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        self.sync_buffer.remove(&id);
        if self.players.is_empty() {
            self.state = RoomState::Vacant;
            self.synchronizing = false;
            self.sync_buffer.clear();
        }
        Some(player)
    }

    /// Begin the match: every current member gets an empty frame buffer and
    /// inbound frames are held back until each buffer reaches `latency`
    /// entries.
    ///
    /// Returns the release schedule if the quota is already met — a lone
    /// player, or a latency of zero — which at this point is always empty.
    pub fn start(&mut self) -> Option<Vec<(PlayerId, String)>> {
        self.state = RoomState::Started;
        self.synchronizing = true;
        self.sync_buffer = self.players.keys().map(|&id| (id, Vec::new())).collect();
        self.evaluate_sync()
    }

    /// Route an inbound frame through the synchronizer.
    pub fn accept_frame(&mut self, sender: PlayerId, frame: String) -> FrameAction {
        if !self.synchronizing {
            return FrameAction::Relay;
        }
        // Buffers exist only for members present at match start.
        if let Some(buffer) = self.sync_buffer.get_mut(&sender) {
            buffer.push(frame);
        }
        match self.evaluate_sync() {
            Some(schedule) => FrameAction::Release(schedule),
            None => FrameAction::Buffered,
        }
    }

    /// Re-evaluate synchronization readiness; called after every buffered
    /// frame, at match start, and when membership shrinks mid-sync so a
    /// departure can never leave the room hanging.
    ///
    /// On readiness the buffers are drained slot-major (slot 0 of every
    /// member, then slot 1, ...) so no member's backlog flushes ahead of
    /// another's, and the drained `(sender, frame)` schedule is returned.
    pub fn evaluate_sync(&mut self) -> Option<Vec<(PlayerId, String)>> {
        if !self.synchronizing {
            return None;
        }
        if self.players.len() >= 2 {
            // A member without a buffer entry never holds up readiness.
            let ready = self.players.keys().all(|id| {
                self.sync_buffer
                    .get(id)
                    .is_none_or(|buffer| buffer.len() >= self.latency)
            });
            if !ready {
                return None;
            }
        }

        self.synchronizing = false;
        let mut schedule = Vec::new();
        for slot in 0..self.latency {
            for id in self.players.keys() {
                if let Some(frame) = self.sync_buffer.get(id).and_then(|b| b.get(slot)) {
                    schedule.push((*id, frame.clone()));
                }
            }
        }
        self.sync_buffer.clear();
        Some(schedule)
    }

    /// Send `msg` to every member, the sender included. The caller holds the
    /// room lock across the fan-out, which keeps delivery order identical at
    /// every member.
    pub fn broadcast_all(&self, msg: &str) {
        for player in self.players.values() {
            if player.sender.send(msg.to_string()).is_err() {
                tracing::warn!("failed to queue message for player {}", player.id);
            }
        }
    }

    /// Send `msg` to every member except `sender_id`.
    pub fn broadcast_except(&self, sender_id: PlayerId, msg: &str) {
        for player in self.players.values() {
            if player.id == sender_id {
                continue;
            }
            if player.sender.send(msg.to_string()).is_err() {
                tracing::warn!("failed to queue frame for player {}", player.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn test_player(id: PlayerId) -> (Player, UnboundedReceiver<String>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let player = Player {
            id,
            name: format!("player-{id}"),
            addr: "127.0.0.1:9000".parse().unwrap(),
            p1: "Davis".to_string(),
            p2: "-".to_string(),
            p3: "-".to_string(),
            p4: "-".to_string(),
            achievements: "0".to_string(),
            sender,
        };
        (player, receiver)
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn fresh_room_is_vacant_with_default_latency() {
        let room = Room::new(3);
        assert_eq!(room.state, RoomState::Vacant);
        assert_eq!(room.latency, DEFAULT_LATENCY);
        assert_eq!(room.player_count(), 0);
    }

    #[test]
    fn first_join_opens_the_lobby_and_last_leave_vacates_it() {
        let mut room = Room::new(1);
        let (alice, _rx) = test_player(1);
        room.add_player(alice);
        assert_eq!(room.state, RoomState::Lobby);

        room.remove_player(1);
        assert_eq!(room.state, RoomState::Vacant);
    }

    #[test]
    fn emptying_a_started_room_resets_the_sync_state() {
        let mut room = Room::new(1);
        let (alice, _rx) = test_player(1);
        room.add_player(alice);
        room.latency = 2;
        room.start();
        room.remove_player(1);
        assert_eq!(room.state, RoomState::Vacant);
        assert!(!room.is_synchronizing());
    }

    #[test]
    fn frames_are_buffered_until_every_member_meets_the_quota() {
        let mut room = Room::new(1);
        let (alice, _a) = test_player(1);
        let (bob, _b) = test_player(2);
        room.add_player(alice);
        room.add_player(bob);
        room.latency = 2;
        assert!(room.start().is_none());

        assert!(matches!(room.accept_frame(1, "F1".into()), FrameAction::Buffered));
        assert!(matches!(room.accept_frame(1, "F2".into()), FrameAction::Buffered));
        assert!(matches!(room.accept_frame(2, "G1".into()), FrameAction::Buffered));

        // The fourth frame completes both quotas; release is slot-major.
        match room.accept_frame(2, "G2".into()) {
            FrameAction::Release(schedule) => {
                let expected = vec![
                    (1, "F1".to_string()),
                    (2, "G1".to_string()),
                    (1, "F2".to_string()),
                    (2, "G2".to_string()),
                ];
                assert_eq!(schedule, expected);
            }
            other => panic!("expected release, got {other:?}"),
        }
        assert!(!room.is_synchronizing());
    }

    #[test]
    fn released_frames_are_neither_lost_nor_duplicated() {
        let mut room = Room::new(1);
        let (alice, _a) = test_player(1);
        let (bob, _b) = test_player(2);
        let (carol, _c) = test_player(3);
        room.add_player(alice);
        room.add_player(bob);
        room.add_player(carol);
        room.latency = 1;
        room.start();

        room.accept_frame(1, "a0".into());
        room.accept_frame(2, "b0".into());
        match room.accept_frame(3, "c0".into()) {
            FrameAction::Release(schedule) => {
                let frames: Vec<&str> = schedule.iter().map(|(_, f)| f.as_str()).collect();
                assert_eq!(frames, vec!["a0", "b0", "c0"]);
            }
            other => panic!("expected release, got {other:?}"),
        }
    }

    #[test]
    fn lone_player_start_is_instantly_ready_with_nothing_released() {
        let mut room = Room::new(1);
        let (alice, _rx) = test_player(1);
        room.add_player(alice);
        room.latency = 3;

        let schedule = room.start().expect("single member is trivially ready");
        assert!(schedule.is_empty());
        assert!(!room.is_synchronizing());
        assert!(matches!(room.accept_frame(1, "F1".into()), FrameAction::Relay));
    }

    #[test]
    fn zero_latency_start_is_instantly_ready() {
        let mut room = Room::new(1);
        let (alice, _a) = test_player(1);
        let (bob, _b) = test_player(2);
        room.add_player(alice);
        room.add_player(bob);
        room.latency = 0;

        let schedule = room.start().expect("zero latency is trivially ready");
        assert!(schedule.is_empty());
        assert!(matches!(room.accept_frame(1, "F1".into()), FrameAction::Relay));
    }

    #[test]
    fn a_departure_mid_sync_recomputes_readiness() {
        let mut room = Room::new(1);
        let (alice, _a) = test_player(1);
        let (bob, _b) = test_player(2);
        room.add_player(alice);
        room.add_player(bob);
        room.latency = 1;
        room.start();

        assert!(matches!(room.accept_frame(1, "F1".into()), FrameAction::Buffered));

        // Bob never delivered; his departure must not leave the room stuck.
        room.remove_player(2);
        let schedule = room.evaluate_sync().expect("remaining member is ready");
        assert_eq!(schedule, vec![(1, "F1".to_string())]);
        assert!(!room.is_synchronizing());
    }

    #[test]
    fn slots_without_a_frame_are_skipped_at_release() {
        let mut room = Room::new(1);
        let (alice, _a) = test_player(1);
        let (bob, _b) = test_player(2);
        room.add_player(alice);
        room.add_player(bob);
        room.latency = 2;
        room.start();

        room.accept_frame(1, "F1".into());
        room.remove_player(2);

        // Only one of the two slots is populated for the remaining member.
        let schedule = room.evaluate_sync().expect("lone member is ready");
        assert_eq!(schedule, vec![(1, "F1".to_string())]);
    }

    #[test]
    fn broadcast_except_skips_the_sender() {
        let mut room = Room::new(1);
        let (alice, mut rx_a) = test_player(1);
        let (bob, mut rx_b) = test_player(2);
        room.add_player(alice);
        room.add_player(bob);

        room.broadcast_except(1, "FRAME\nX");
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec!["FRAME\nX".to_string()]);
    }

    #[test]
    fn broadcast_all_reaches_every_member() {
        let mut room = Room::new(1);
        let (alice, mut rx_a) = test_player(1);
        let (bob, mut rx_b) = test_player(2);
        room.add_player(alice);
        room.add_player(bob);

        room.broadcast_all("CHAT\n1\nalice\nhi");
        assert_eq!(drain(&mut rx_a), vec!["CHAT\n1\nalice\nhi".to_string()]);
        assert_eq!(drain(&mut rx_b), vec!["CHAT\n1\nalice\nhi".to_string()]);
    }

    #[test]
    fn a_dropped_receiver_does_not_abort_the_fan_out() {
        let mut room = Room::new(1);
        let (alice, rx_a) = test_player(1);
        let (bob, mut rx_b) = test_player(2);
        room.add_player(alice);
        room.add_player(bob);
        drop(rx_a);

        room.broadcast_all("PING");
        assert_eq!(drain(&mut rx_b), vec!["PING".to_string()]);
    }
}
