//! Shared value types for proxyscan: target and port parsing, route lookup
//! and the progress reporting seam used by the enumerator.

pub mod network;
pub mod progress;
pub mod utils;
