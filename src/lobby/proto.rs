//! Wire format of the lobby's newline-delimited text protocol.
//!
//! A message is a single WebSocket text frame whose first line is the
//! command. Server-to-client records that repeat per room or per player
//! separate the blocks with a `¶` line.

use crate::lobby::room::{PlayerId, Room};

/// Greeting sent right after the connection is accepted.
pub fn your_id(id: PlayerId) -> String {
    format!("YOUR_ID\n{id}\n200\n-999\n-999\n-999")
}

/// Confirmation sent to a player that just left a room.
pub fn left_room(room_id: u8) -> String {
    format!("LEFT_ROOM\n{room_id}")
}

pub fn room_now_started(room_id: u8, age_millis: u128) -> String {
    format!("ROOM_NOW_STARTED\n{room_id}\n{age_millis}")
}

pub fn chat(id: PlayerId, name: &str, text: &str) -> String {
    format!("CHAT\n{id}\n{name}\n{text}")
}

/// One `¶`-prefixed block of the LIST reply. The caller seeds the buffer
/// with `LIST\n\n` and appends one block per room, locking room by room.
pub fn append_room_summary(buf: &mut String, room: &Room) {
    let names: Vec<&str> = room.players().map(|p| p.name.as_str()).collect();
    buf.push_str(&format!(
        "¶\nRoom\n{}\n{}\n{}\n{}\n{}\n{}\n",
        room.id,
        room.state,
        room.latency,
        room.age_millis(),
        room.player_count(),
        names.join(", "),
    ));
}

/// Full member roster of one room, broadcast after every membership or
/// latency change.
pub fn player_list(room: &Room) -> String {
    let mut buf = format!("PLAYER_LIST\n{}\n{}\n", room.id, room.latency);
    for p in room.players() {
        buf.push_str(&format!(
            "¶\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            p.id, p.name, p.p1, p.p2, p.p3, p.p4, p.achievements,
        ));
    }
    buf
}

pub fn admin_stats() -> &'static str {
    "STATS 0 0"
}

/// One line of the admin ROOM_LIST report.
pub fn append_admin_room_line(buf: &mut String, room: &Room) {
    let infos: Vec<String> = room
        .players()
        .map(|p| format!("{{Name: {}, ID: {}, IP: {}}}", p.name, p.id, p.addr))
        .collect();
    buf.push_str(&format!(
        "Room {} [{}] {} {} {}\n",
        room.id,
        room.state,
        room.latency,
        room.age_millis(),
        infos.join(", "),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::room::Player;
    use tokio::sync::mpsc;

    fn member(id: PlayerId, name: &str) -> Player {
        let (sender, _receiver) = mpsc::unbounded_channel();
        Player {
            id,
            name: name.to_string(),
            addr: "10.0.0.7:4321".parse().unwrap(),
            p1: "Deep".to_string(),
            p2: "Davis".to_string(),
            p3: "-".to_string(),
            p4: "-".to_string(),
            achievements: "42".to_string(),
            sender,
        }
    }

    #[test]
    fn your_id_carries_the_fixed_trailer() {
        assert_eq!(your_id(7), "YOUR_ID\n7\n200\n-999\n-999\n-999");
    }

    #[test]
    fn chat_lines_carry_sender_identity() {
        assert_eq!(chat(3, "alice", "hello"), "CHAT\n3\nalice\nhello");
    }

    #[test]
    fn player_list_emits_one_block_per_member() {
        let mut room = Room::new(5);
        room.latency = 4;
        room.add_player(member(1, "alice"));
        room.add_player(member(2, "bob"));

        let msg = player_list(&room);
        assert!(msg.starts_with("PLAYER_LIST\n5\n4\n"));
        assert_eq!(msg.matches('¶').count(), 2);
        assert!(msg.contains("¶\n1\nalice\nDeep\nDavis\n-\n-\n42\n"));
        assert!(msg.contains("¶\n2\nbob\n"));
    }

    #[test]
    fn room_summary_lists_names_comma_joined() {
        let mut room = Room::new(2);
        room.add_player(member(1, "alice"));
        room.add_player(member(2, "bob"));

        let mut buf = String::new();
        append_room_summary(&mut buf, &room);
        let lines: Vec<&str> = buf.lines().collect();
        assert_eq!(lines[0], "¶");
        assert_eq!(lines[1], "Room");
        assert_eq!(lines[2], "2");
        assert_eq!(lines[3], "LOBBY");
        assert_eq!(lines[4], "3");
        assert!(lines[5].parse::<u128>().is_ok(), "age must be numeric");
        assert_eq!(lines[6], "2");
        assert_eq!(lines[7], "alice, bob");
    }

    #[test]
    fn admin_line_includes_member_addresses() {
        let mut room = Room::new(1);
        room.add_player(member(9, "zed"));

        let mut buf = String::new();
        append_admin_room_line(&mut buf, &room);
        assert!(buf.starts_with("Room 1 [LOBBY] 3 "));
        assert!(buf.trim_end().ends_with("{Name: zed, ID: 9, IP: 10.0.0.7:4321}"));
    }
}
