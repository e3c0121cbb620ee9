//! Network backbone for a LittleFighter-style multiplayer fighting game.
//!
//! Two cooperating services live in this crate: a lobby/room server speaking
//! the game's newline-delimited text protocol (room listing, chat, match
//! start, lockstep frame relay with a pre-match synchronization buffer), and
//! a WebSocket relay that lets a game server behind NAT accept peer
//! connections by reversing the connection direction.

pub mod common;
pub mod lobby;
pub mod relay;
