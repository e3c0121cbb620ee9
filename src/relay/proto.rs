//! JSON control envelope spoken on relay WebSockets.
//!
//! Control frames are text messages of the form `{"type": ..., "payload":
//! ...}`. Binary frames carry opaque game bytes and never enter this codec.

use serde::{Deserialize, Serialize};

/// Control messages exchanged between the relay, the host and its peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ControlMessage {
    /// First message on `/ws-host`: claim the room's host slot.
    RegisterHost,
    /// First message on `/ws-host`: this socket is the data side for the
    /// named pending peer.
    DataConn { peer_id: String },
    /// Relay to host: a peer is waiting to be paired.
    NewPeer { peer_id: String },
    /// Application-level heartbeat, distinct from transport pings.
    Ping,
    /// Heartbeat reply.
    Pong,
}

impl ControlMessage {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("control message serialization cannot fail")
    }

    /// Decode a control frame; anything malformed is a protocol error the
    /// caller reports and drops.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_frames_match_the_wire_format() {
        assert_eq!(ControlMessage::Ping.encode(), r#"{"type":"ping"}"#);
        assert_eq!(ControlMessage::Pong.encode(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn new_peer_nests_the_id_in_the_payload() {
        let msg = ControlMessage::NewPeer {
            peer_id: "peer_7".to_string(),
        };
        assert_eq!(
            msg.encode(),
            r#"{"type":"new_peer","payload":{"peer_id":"peer_7"}}"#
        );
    }

    #[test]
    fn data_conn_round_trips() {
        let raw = r#"{"type":"data_conn","payload":{"peer_id":"peer_3"}}"#;
        assert_eq!(
            ControlMessage::decode(raw).unwrap(),
            ControlMessage::DataConn {
                peer_id: "peer_3".to_string()
            }
        );
    }

    #[test]
    fn register_host_tolerates_a_null_payload() {
        // Some host implementations always emit the payload key.
        let raw = r#"{"type":"register_host","payload":null}"#;
        assert_eq!(
            ControlMessage::decode(raw).unwrap(),
            ControlMessage::RegisterHost
        );
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(ControlMessage::decode(r#"{"type":"handshake"}"#).is_err());
        assert!(ControlMessage::decode("not json at all").is_err());
    }
}
