//! NAT-traversal relay: pairing registry, byte forwarding, and the client
//! run next to the game server (host) or a game client (peer).

pub mod client;
pub mod proto;
pub mod registry;
pub mod server;
pub mod socket;

pub use server::run_relay_server;
