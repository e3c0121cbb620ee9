//! Logging setup for the server and client binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

/// Targets raised to the requested level when `RUST_LOG` is not set.
const CRATE_TARGETS: &[&str] = &["brawlhub::lobby", "brawlhub::relay", "brawlhub::common"];

/// Initialize tracing for a binary.
///
/// Without `RUST_LOG`, `default_level` applies to this crate's modules and
/// to the binary itself while everything else stays at `warn`, so the HTTP
/// stack's wire-level noise is off by default. Setting `RUST_LOG` replaces
/// the filter entirely.
pub fn init_tracing(binary_name: &str, default_level: &str) {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    if std::env::var_os("RUST_LOG").is_none() {
        for target in CRATE_TARGETS.iter().chain(std::iter::once(&binary_name)) {
            if let Ok(directive) = format!("{target}={default_level}").parse() {
                filter = filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
