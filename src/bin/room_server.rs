//! Lobby/room server for LittleFighter-style matches.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin room_server
//! cargo run --bin room_server -- --host 0.0.0.0 --port 8080
//! ```

use brawlhub::common::logger::init_tracing;
use brawlhub::lobby::run_lobby_server;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "room_server")]
#[command(about = "Lobby server with rooms, chat and lockstep frame relay", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    init_tracing(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    if let Err(e) = run_lobby_server(&args.host, args.port).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
