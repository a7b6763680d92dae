//! SYN probing over a layer 4 raw socket.
//!
//! The kernel fills in the IPv4 header, so only the TCP segment is built
//! here. Replies are read from the same channel on a dedicated thread.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pnet::packet::Packet;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::TcpPacket;
use pnet::transport::{
    self, TransportChannelType, TransportProtocol, TransportReceiver, TransportSender,
};
use proxyscan_common::network::interface::{self, Route};
use proxyscan_protocols::tcp;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info};

use super::syn::{Correlator, Emitter, Listener, SynDetector};
use crate::config::ScanConfig;
use crate::error::DetectorError;

const TRANSPORT_BUFFER_SIZE: usize = 4096;
const CHANNEL_TYPE_TCP: TransportChannelType =
    TransportChannelType::Layer4(TransportProtocol::Ipv4(IpNextHeaderProtocols::Tcp));
/// Upper bound on how long the listener takes to notice a stop request.
const READ_TIMEOUT: Duration = Duration::from_millis(50);

pub struct TransportEmitter {
    tx: TransportSender,
}

impl Emitter for TransportEmitter {
    fn emit(&mut self, local: SocketAddrV4, dst: SocketAddrV4, seq: u32) -> io::Result<()> {
        let segment: Vec<u8> = tcp::syn_packet(local, dst, seq).map_err(io::Error::other)?;
        let packet = TcpPacket::new(&segment)
            .ok_or_else(|| io::Error::other("SYN segment too short"))?;
        self.tx.send_to(packet, IpAddr::V4(*dst.ip()))?;
        Ok(())
    }
}

pub type RawSocketDetector = SynDetector<TransportEmitter>;

impl RawSocketDetector {
    /// Opens the raw channel and starts listening. Needs CAP_NET_RAW.
    pub fn open(config: &ScanConfig, first_target: Ipv4Addr) -> Result<Self, DetectorError> {
        let route: Route = interface::resolve_route(first_target, config.interface.as_deref())?;
        let (tx, rx) = transport::transport_channel(TRANSPORT_BUFFER_SIZE, CHANNEL_TYPE_TCP)
            .map_err(|e| DetectorError::channel("transport", e))?;

        let correlator = Arc::new(Correlator::new(route.source, config.reply_linger));
        info!(
            "Raw SYN probes from {} on {}",
            correlator.local(),
            route.interface.name
        );

        let (alive_tx, alive_rx) = mpsc::unbounded_channel();
        let listening = correlator.clone();
        let listener = Listener::spawn("raw-listener", move |stop| {
            listen(rx, &listening, alive_tx, stop)
        })?;

        Ok(SynDetector::new(
            TransportEmitter { tx },
            correlator,
            listener,
            alive_rx,
            config.scan_rate,
            config.reply_linger,
        ))
    }
}

fn listen(
    mut rx: TransportReceiver,
    correlator: &Correlator,
    alive: UnboundedSender<SocketAddrV4>,
    stop: &AtomicBool,
) {
    let mut packets = transport::tcp_packet_iter(&mut rx);
    while !stop.load(Ordering::Relaxed) {
        match packets.next_with_timeout(READ_TIMEOUT) {
            Ok(Some((packet, IpAddr::V4(remote)))) => {
                let Some(endpoint) = correlator.claim(remote, packet.packet()) else {
                    continue;
                };
                if alive.send(endpoint).is_err() {
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                debug!("Raw receive failed: {e}");
                std::thread::sleep(READ_TIMEOUT);
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::LivenessDetector;
    use tokio::net::TcpListener;

    // Needs root. Loopback SYN-ACKs come back through the same raw socket.
    #[tokio::test]
    #[ignore]
    async fn raw_detector_finds_loopback_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = ScanConfig {
            reply_linger: Duration::from_millis(500),
            ..ScanConfig::default()
        };

        let mut detector = RawSocketDetector::open(&config, Ipv4Addr::LOCALHOST).unwrap();
        let mut alive = detector.take_alive().unwrap();
        let target = SocketAddrV4::new(Ipv4Addr::LOCALHOST, port);
        detector.send(target).await;
        detector.wait().await;

        assert_eq!(alive.recv().await, Some(target));
        assert_eq!(alive.recv().await, None);
    }
}
