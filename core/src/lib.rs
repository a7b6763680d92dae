//! Two-phase SOCKS5 proxy discovery.
//!
//! Phase one walks an address space and asks a [`detector::LivenessDetector`]
//! which endpoints accept TCP connections. Phase two tunnels a real HTTP
//! request through every live endpoint with the [`validator::Socks5Validator`]
//! and keeps the ones that answer. [`scanner::Scanner`] drives both phases.

pub mod collector;
pub mod config;
pub mod detector;
pub mod enumerator;
pub mod error;
pub mod pool;
pub mod scanner;
pub mod validator;

pub use config::{ScanConfig, Strategy};
pub use error::DetectorError;
pub use scanner::{ScanState, Scanner};
