//! Relay client: run next to the game server (host mode) or next to a game
//! client (peer mode).
//!
//! Run with:
//! ```not_rust
//! cargo run --bin relay_client -- --mode host --server relay.example.com:28080 --room duel --game localhost:8080
//! cargo run --bin relay_client -- --mode peer --server relay.example.com:28080 --room duel --local localhost:8081
//! ```

use brawlhub::common::logger::init_tracing;
use brawlhub::relay::client::{HostConfig, PeerConfig, run_host, run_peer};
use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Host,
    Peer,
}

#[derive(Parser, Debug)]
#[command(name = "relay_client")]
#[command(about = "Tunnel game traffic through the relay", long_about = None)]
struct Args {
    /// Run next to the game server (host) or next to a game client (peer)
    #[arg(short, long, value_enum, default_value_t = Mode::Peer)]
    mode: Mode,

    /// Relay server address, e.g. wss://relay.example.com or host:port
    #[arg(short, long, default_value = "localhost:28080")]
    server: String,

    /// Relay room shared between the host and its peers
    #[arg(short, long, default_value = "default")]
    room: String,

    /// Game server address to forward to (host mode)
    #[arg(short, long, default_value = "localhost:8080")]
    game: String,

    /// Local address game clients connect to (peer mode)
    #[arg(short, long, default_value = "localhost:8081")]
    local: String,
}

#[tokio::main]
async fn main() {
    init_tracing(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    tracing::info!("starting relay client in {:?} mode", args.mode);

    let result = match args.mode {
        Mode::Host => {
            run_host(HostConfig {
                server: args.server,
                room: args.room,
                game_addr: args.game,
            })
            .await
        }
        Mode::Peer => {
            run_peer(PeerConfig {
                server: args.server,
                room: args.room,
                listen_addr: args.local,
            })
            .await
        }
    };
    if let Err(e) = result {
        tracing::error!("relay client error: {}", e);
        std::process::exit(1);
    }
}
