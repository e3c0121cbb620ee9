//! Shared pieces used by all three binaries.

pub mod logger;
pub mod shutdown;
