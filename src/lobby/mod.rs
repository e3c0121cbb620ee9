//! Lobby server: rooms, the text protocol, and the frame synchronizer.

pub mod proto;
pub mod room;
pub mod server;

pub use server::run_lobby_server;
