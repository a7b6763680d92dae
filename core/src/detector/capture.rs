//! SYN probing at the link layer.
//!
//! Frames are written straight onto the routed interface and replies are
//! picked out of everything the interface sees. Off-link destinations go to
//! the default gateway's MAC, resolved once at setup. On-link destinations go
//! to their own MAC: the first probe to such a host is held back behind an
//! ARP request, and the listener releases it when the reply is captured.

use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::ipnetwork::Ipv4Network;
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::util::MacAddr;
use proxyscan_common::network::interface::{self, Route};
use proxyscan_protocols::{self as protocol, arp, ipv4};
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, info, warn};

use super::syn::{Correlator, Emitter, Listener, SynDetector};
use crate::config::ScanConfig;
use crate::error::DetectorError;

const READ_TIMEOUT: Duration = Duration::from_millis(50);
const ARP_TIMEOUT: Duration = Duration::from_millis(2_000);
const ARP_RETRY: Duration = Duration::from_millis(500);

/// A SYN waiting for its destination's MAC.
type HeldProbe = (SocketAddrV4, SocketAddrV4, u32);

#[derive(Default)]
struct Neighbors {
    known: HashMap<Ipv4Addr, MacAddr>,
    waiting: HashMap<Ipv4Addr, Vec<HeldProbe>>,
}

/// Sending side of the interface, shared by the emitter and the listener.
pub struct Link {
    tx: Mutex<Box<dyn DataLinkSender>>,
    src_mac: MacAddr,
    src_addr: Ipv4Addr,
    network: Option<Ipv4Network>,
    gateway_mac: Option<MacAddr>,
    neighbors: Mutex<Neighbors>,
}

impl Link {
    fn new(
        tx: Box<dyn DataLinkSender>,
        (src_mac, src_addr): (MacAddr, Ipv4Addr),
        network: Option<Ipv4Network>,
        gateway_mac: Option<MacAddr>,
    ) -> Self {
        Self {
            tx: Mutex::new(tx),
            src_mac,
            src_addr,
            network,
            gateway_mac,
            neighbors: Mutex::new(Neighbors::default()),
        }
    }

    fn neighbors(&self) -> MutexGuard<'_, Neighbors> {
        self.neighbors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_on_link(&self, addr: Ipv4Addr) -> bool {
        self.network.is_some_and(|net| net.contains(addr))
    }

    fn send_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.send_to(frame, None) {
            Some(result) => result,
            None => Err(io::Error::other("datalink sender refused the frame")),
        }
    }

    fn send_syn(&self, next_hop: MacAddr, (local, dst, seq): HeldProbe) -> io::Result<()> {
        let frame: Vec<u8> = protocol::create_syn_frame(self.src_mac, next_hop, local, dst, seq)
            .map_err(io::Error::other)?;
        self.send_frame(&frame)
    }

    fn probe(&self, probe: HeldProbe) -> io::Result<()> {
        let addr: Ipv4Addr = *probe.1.ip();
        if !self.is_on_link(addr) {
            let gateway_mac = self.gateway_mac.ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NetworkUnreachable,
                    format!("no gateway towards off-link {addr}"),
                )
            })?;
            return self.send_syn(gateway_mac, probe);
        }

        let mut neighbors = self.neighbors();
        if let Some(&mac) = neighbors.known.get(&addr) {
            drop(neighbors);
            return self.send_syn(mac, probe);
        }
        let held = neighbors.waiting.entry(addr).or_default();
        held.push(probe);
        if held.len() > 1 {
            // request already out
            return Ok(());
        }
        drop(neighbors);

        let sent = arp::create_request(self.src_mac, self.src_addr, addr)
            .map_err(io::Error::other)
            .and_then(|request| self.send_frame(&request));
        if sent.is_err() {
            self.neighbors().waiting.remove(&addr);
        }
        sent
    }

    /// Records the sender of an ARP reply and sends the probes held for it.
    /// Returns whether `frame` was an ARP reply.
    fn learn(&self, frame: &[u8]) -> bool {
        let Some((sender, mac)) = arp::parse_any_reply(frame) else {
            return false;
        };
        if !self.is_on_link(sender) {
            return true;
        }
        let held: Vec<HeldProbe> = {
            let mut neighbors = self.neighbors();
            neighbors.known.insert(sender, mac);
            neighbors.waiting.remove(&sender).unwrap_or_default()
        };
        for probe in held {
            if let Err(e) = self.send_syn(mac, probe) {
                debug!("Held SYN to {} failed: {e}", probe.1);
            }
        }
        true
    }
}

pub struct FrameEmitter {
    link: Arc<Link>,
}

impl Emitter for FrameEmitter {
    fn emit(&mut self, local: SocketAddrV4, dst: SocketAddrV4, seq: u32) -> io::Result<()> {
        self.link.probe((local, dst, seq))
    }
}

pub type CaptureDetector = SynDetector<FrameEmitter>;

impl CaptureDetector {
    /// Opens an Ethernet channel on the routed interface and resolves the
    /// gateway before any probe goes out. Needs CAP_NET_RAW.
    ///
    /// The gateway is mandatory only when `first_target` is off-link.
    pub fn open(config: &ScanConfig, first_target: Ipv4Addr) -> Result<Self, DetectorError> {
        let route: Route = interface::resolve_route(first_target, config.interface.as_deref())?;
        let name: &str = &route.interface.name;
        let src_mac: MacAddr = route
            .interface
            .mac
            .filter(|mac| *mac != MacAddr::zero())
            .ok_or_else(|| DetectorError::NoMac(name.to_string()))?;
        let needs_gateway: bool = !route.is_on_link(first_target);

        let (mut tx, mut rx) = open_eth_channel(&route.interface, &channel_config(), datalink::channel)?;
        let gateway_mac: Option<MacAddr> =
            match config.gateway.or_else(|| interface::default_gateway(name)) {
                Some(gateway) => match resolve_gateway_mac(
                    tx.as_mut(),
                    rx.as_mut(),
                    (src_mac, route.source),
                    gateway,
                    ARP_TIMEOUT,
                ) {
                    Ok(mac) => {
                        info!("Gateway {gateway} is at {mac}");
                        Some(mac)
                    }
                    Err(e) if !needs_gateway => {
                        warn!("{e}, off-link targets will be skipped");
                        None
                    }
                    Err(e) => return Err(e),
                },
                None if needs_gateway => return Err(DetectorError::NoGateway(name.to_string())),
                None => {
                    info!("No gateway on {name}, only on-link targets are reachable");
                    None
                }
            };

        let correlator = Arc::new(Correlator::new(route.source, config.reply_linger));
        info!("Link-layer SYN probes from {} on {name}", correlator.local());

        let link = Arc::new(Link::new(
            tx,
            (src_mac, route.source),
            route.network(),
            gateway_mac,
        ));
        let (alive_tx, alive_rx) = mpsc::unbounded_channel();
        let listening = correlator.clone();
        let listening_link = link.clone();
        let listener = Listener::spawn("capture-listener", move |stop| {
            listen(rx, &listening, &listening_link, alive_tx, stop)
        })?;

        Ok(SynDetector::new(
            FrameEmitter { link },
            correlator,
            listener,
            alive_rx,
            config.scan_rate,
            config.reply_linger,
        ))
    }
}

fn channel_config() -> Config {
    Config {
        read_timeout: Some(READ_TIMEOUT),
        ..Default::default()
    }
}

fn open_eth_channel<F>(
    intf: &NetworkInterface,
    cfg: &Config,
    channel_opener: F,
) -> Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>), DetectorError>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let ch: Channel =
        channel_opener(intf, *cfg).map_err(|e| DetectorError::channel("datalink", e))?;
    match ch {
        Channel::Ethernet(tx, rx) => Ok((tx, rx)),
        _ => Err(DetectorError::NotEthernet(intf.name.clone())),
    }
}

/// Broadcasts ARP requests for `gateway` until it answers or `timeout`
/// passes. Unrelated frames read in the meantime are discarded.
fn resolve_gateway_mac(
    tx: &mut dyn DataLinkSender,
    rx: &mut dyn DataLinkReceiver,
    (src_mac, src_addr): (MacAddr, Ipv4Addr),
    gateway: Ipv4Addr,
    timeout: Duration,
) -> Result<MacAddr, DetectorError> {
    let request: Vec<u8> = arp::create_request(src_mac, src_addr, gateway)?;
    let deadline = Instant::now() + timeout;
    let mut next_request = Instant::now();

    while Instant::now() < deadline {
        if Instant::now() >= next_request {
            if let Some(Err(e)) = tx.send_to(&request, None) {
                debug!("ARP request for {gateway} failed: {e}");
            }
            next_request = Instant::now() + ARP_RETRY;
        }
        if let Ok(frame) = rx.next() {
            if let Some(mac) = arp::parse_reply(frame, gateway) {
                return Ok(mac);
            }
        }
    }
    Err(DetectorError::ArpTimeout(gateway))
}

/// The endpoint a captured frame answers, if any.
fn reply_endpoint(frame: &[u8], correlator: &Correlator) -> Option<SocketAddrV4> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let local: Ipv4Addr = *correlator.local().ip();
    let (remote, segment) = ipv4::tcp_segment_for(eth.payload(), local)?;
    correlator.claim(remote, segment)
}

fn listen(
    mut rx: Box<dyn DataLinkReceiver>,
    correlator: &Correlator,
    link: &Link,
    alive: UnboundedSender<SocketAddrV4>,
    stop: &AtomicBool,
) {
    while !stop.load(Ordering::Relaxed) {
        match rx.next() {
            Ok(frame) => {
                if link.learn(frame) {
                    continue;
                }
                let Some(endpoint) = reply_endpoint(frame, correlator) else {
                    continue;
                };
                if alive.send(endpoint).is_err() {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => {
                debug!("Capture receive failed: {e}");
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
