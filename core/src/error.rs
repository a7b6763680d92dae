use std::io;
use std::net::Ipv4Addr;

use proxyscan_common::network::interface::RouteError;
use proxyscan_protocols::PacketError;
use thiserror::Error;

/// Failures while setting up a liveness detector. Any of these aborts the
/// scan before a single probe is sent.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("scan rate must be greater than zero")]
    ZeroRate,
    #[error("permission denied opening {kind} channel (requires root or CAP_NET_RAW)")]
    Privilege {
        kind: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("failed to open {kind} channel: {source}")]
    Channel {
        kind: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("non-ethernet channel for {0}")]
    NotEthernet(String),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error("interface '{0}' has no MAC address")]
    NoMac(String),
    #[error("no default gateway found for '{0}', pass one with --gateway")]
    NoGateway(String),
    #[error("gateway {0} did not answer ARP")]
    ArpTimeout(Ipv4Addr),
    #[error("failed to build probe: {0}")]
    Packet(#[from] PacketError),
    #[error("detector setup was interrupted: {0}")]
    Setup(#[from] tokio::task::JoinError),
}

impl DetectorError {
    /// Wraps a channel open failure, singling out missing privileges.
    pub fn channel(kind: &'static str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            DetectorError::Privilege { kind, source }
        } else {
            DetectorError::Channel { kind, source }
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
