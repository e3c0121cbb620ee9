//! NAT-traversal relay server.
//!
//! Pairs anonymous peer connections with data channels opened on demand by
//! a registered host, one relay room per hosted game.
//!
//! Run with:
//! ```not_rust
//! cargo run --bin relay_server
//! cargo run --bin relay_server -- --port 28080
//! ```

use brawlhub::common::logger::init_tracing;
use brawlhub::relay::run_relay_server;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "relay_server")]
#[command(about = "WebSocket relay pairing NAT'd game hosts with their peers", long_about = None)]
struct Args {
    /// Host address to bind the server to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, default_value = "28080")]
    port: u16,
}

#[tokio::main]
async fn main() {
    init_tracing(env!("CARGO_BIN_NAME"), "info");

    let args = Args::parse();
    if let Err(e) = run_relay_server(&args.host, args.port).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
