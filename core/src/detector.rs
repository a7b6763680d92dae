//! Phase one: which endpoints accept TCP connections.
//!
//! Every strategy implements [`LivenessDetector`]. Callers push endpoints in
//! with [`LivenessDetector::send`], read confirmed endpoints from the stream
//! returned by [`LivenessDetector::take_alive`], and call
//! [`LivenessDetector::wait`] once everything has been sent. After `wait`
//! returns the stream yields whatever is still buffered and then ends.
//!
//! The `raw` and `capture` strategies send bare SYNs and recognise replies
//! without holding per-probe sockets. They need raw socket privileges.

use std::net::{Ipv4Addr, SocketAddrV4};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::debug;

use crate::config::{ScanConfig, Strategy};
use crate::error::DetectorError;

mod capture;
mod connect;
mod raw;
mod syn;

pub use capture::CaptureDetector;
pub use connect::ConnectDetector;
pub use raw::RawSocketDetector;
pub use syn::{Emitter, SynDetector};

pub type AliveStream = UnboundedReceiver<SocketAddrV4>;

#[async_trait]
pub trait LivenessDetector: Send {
    /// Probes `endpoint`. May wait to respect the configured rate.
    async fn send(&mut self, endpoint: SocketAddrV4);

    /// Hands out the stream of live endpoints. Only the first call returns
    /// `Some`.
    fn take_alive(&mut self) -> Option<AliveStream>;

    /// Returns once every probe sent so far has been answered or given up on.
    async fn wait(&mut self);
}

/// Opens the detector selected by `config.strategy`.
///
/// `first_target` picks the route for the packet-level strategies.
pub async fn open(
    config: &ScanConfig,
    first_target: Ipv4Addr,
) -> Result<Box<dyn LivenessDetector>, DetectorError> {
    if config.scan_rate == 0 {
        return Err(DetectorError::ZeroRate);
    }
    debug!("Opening {} detector", config.strategy);

    match config.strategy {
        Strategy::Connect => Ok(Box::new(ConnectDetector::new(
            config.scan_rate,
            config.connect_timeout,
        ))),
        Strategy::RawSocket => {
            let config = config.clone();
            // channel setup blocks on syscalls
            let detector =
                tokio::task::spawn_blocking(move || RawSocketDetector::open(&config, first_target))
                    .await??;
            Ok(Box::new(detector))
        }
        Strategy::Capture => {
            let config = config.clone();
            // gateway ARP resolution blocks for up to a couple of seconds
            let detector =
                tokio::task::spawn_blocking(move || CaptureDetector::open(&config, first_target))
                    .await??;
            Ok(Box::new(detector))
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
