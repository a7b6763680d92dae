//! Route lookup for the packet-level detectors.
//!
//! The raw and capture detectors craft their own TCP segments, so they need the
//! source address the kernel would pick and, for link-layer capture, the
//! interface and next hop. The connect detector never touches this module.

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::Ipv4Network;
use thiserror::Error;

use crate::utils::interface::NetworkInterfaceExtension;

const RTF_GATEWAY: u32 = 0x2;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route lookup towards {target} failed: {source}")]
    Lookup {
        target: Ipv4Addr,
        #[source]
        source: io::Error,
    },
    #[error("route towards {0} does not use an IPv4 source")]
    NotIpv4(Ipv4Addr),
    #[error("interface '{0}' does not exist")]
    UnknownInterface(String),
    #[error("interface '{0}' has no usable IPv4 address")]
    NoIpv4(String),
    #[error("no interface owns source address {0}")]
    NoOwner(Ipv4Addr),
}

/// Where probe packets leave from.
#[derive(Debug, Clone)]
pub struct Route {
    pub interface: NetworkInterface,
    pub source: Ipv4Addr,
}

impl Route {
    /// The interface network `source` belongs to.
    pub fn network(&self) -> Option<Ipv4Network> {
        self.interface
            .get_ipv4_nets()
            .into_iter()
            .find(|net| net.ip() == self.source)
    }

    /// Whether `addr` sits on the local segment and needs no gateway.
    pub fn is_on_link(&self, addr: Ipv4Addr) -> bool {
        self.network().is_some_and(|net| net.contains(addr))
    }
}

/// Resolves the outgoing interface and source address for `target`.
///
/// With `interface_name` set, that interface and its first IPv4 address are
/// used as is. Otherwise the routing table decides.
pub fn resolve_route(target: Ipv4Addr, interface_name: Option<&str>) -> Result<Route, RouteError> {
    let interfaces: Vec<NetworkInterface> = datalink::interfaces();

    if let Some(name) = interface_name {
        return select_named(&interfaces, name);
    }

    let source: Ipv4Addr = route_source_ip(target)?;
    select_owner(&interfaces, source)
}

/// Asks the kernel which source address it would use towards `target` by
/// connecting a UDP socket. No packet leaves the host.
pub fn route_source_ip(target: Ipv4Addr) -> Result<Ipv4Addr, RouteError> {
    let lookup_err = |source: io::Error| RouteError::Lookup { target, source };
    let socket = UdpSocket::bind("0.0.0.0:0").map_err(lookup_err)?;
    socket.connect((target, 53)).map_err(lookup_err)?;
    match socket.local_addr().map_err(lookup_err)?.ip() {
        IpAddr::V4(source) => Ok(source),
        IpAddr::V6(_) => Err(RouteError::NotIpv4(target)),
    }
}

/// Targets after the first whose kernel-chosen source differs from the
/// first target's, with that source. Packet-level probes carry one fixed
/// source address, so replies from these targets are unlikely to arrive.
pub fn divergent_routes(targets: &[Ipv4Addr]) -> Vec<(Ipv4Addr, Ipv4Addr)> {
    divergent_routes_with(targets, route_source_ip)
}

fn divergent_routes_with<F>(targets: &[Ipv4Addr], lookup: F) -> Vec<(Ipv4Addr, Ipv4Addr)>
where
    F: Fn(Ipv4Addr) -> Result<Ipv4Addr, RouteError>,
{
    let Some((&first, rest)) = targets.split_first() else {
        return Vec::new();
    };
    let Ok(expected) = lookup(first) else {
        return Vec::new();
    };
    rest.iter()
        .filter_map(|&target| match lookup(target) {
            Ok(source) if source != expected => Some((target, source)),
            _ => None,
        })
        .collect()
}

fn select_named(interfaces: &[NetworkInterface], name: &str) -> Result<Route, RouteError> {
    let interface = interfaces
        .iter()
        .find(|intf| intf.name == name)
        .ok_or_else(|| RouteError::UnknownInterface(name.to_string()))?;

    let source = interface
        .get_ipv4_range()
        .or_else(|| interface.get_ipv4_nets().first().copied())
        .map(|net| net.ip())
        .ok_or_else(|| RouteError::NoIpv4(name.to_string()))?;

    Ok(Route {
        interface: interface.clone(),
        source,
    })
}

fn select_owner(interfaces: &[NetworkInterface], source: Ipv4Addr) -> Result<Route, RouteError> {
    interfaces
        .iter()
        .find(|intf| intf.has_ipv4(source))
        .map(|intf| Route {
            interface: intf.clone(),
            source,
        })
        .ok_or(RouteError::NoOwner(source))
}

/// Default IPv4 gateway of `interface_name`, read from the kernel routing table.
#[cfg(target_os = "linux")]
pub fn default_gateway(interface_name: &str) -> Option<Ipv4Addr> {
    let table = std::fs::read_to_string("/proc/net/route").ok()?;
    parse_route_table(&table, interface_name)
}

#[cfg(not(target_os = "linux"))]
pub fn default_gateway(_interface_name: &str) -> Option<Ipv4Addr> {
    None
}

/// Finds the default route of `interface_name` in `/proc/net/route` syntax.
/// Addresses there are host-order hex.
pub fn parse_route_table(table: &str, interface_name: &str) -> Option<Ipv4Addr> {
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 || fields[0] != interface_name || fields[1] != "00000000" {
            return None;
        }
        let flags = u32::from_str_radix(fields[3], 16).ok()?;
        if flags & RTF_GATEWAY == 0 {
            return None;
        }
        let gateway = u32::from_str_radix(fields[2], 16).ok()?;
        Some(Ipv4Addr::from(gateway.to_le_bytes()))
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
