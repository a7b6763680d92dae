use std::net::Ipv4Addr;

use pnet::ipnetwork::{IpNetworkError, Ipv4Network};

/// An inclusive `start..=end` span of IPv4 addresses, as typed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    /// Splits the span into the smallest list of prefixes covering it exactly,
    /// in ascending order. An inverted span yields nothing.
    pub fn to_prefixes(&self) -> Vec<Ipv4Network> {
        let mut prefixes: Vec<Ipv4Network> = Vec::new();
        let mut current: u64 = u32::from(self.start_addr) as u64;
        let end: u64 = u32::from(self.end_addr) as u64;

        while current <= end {
            // Largest block aligned on `current`, shrunk until it fits before `end`.
            let mut host_bits: u32 = if current == 0 { 32 } else { current.trailing_zeros().min(32) };
            while current + (1u64 << host_bits) - 1 > end {
                host_bits -= 1;
            }
            let prefix: u8 = (32 - host_bits) as u8;
            if let Ok(net) = Ipv4Network::new(Ipv4Addr::from(current as u32), prefix) {
                prefixes.push(net);
            }
            current += 1u64 << host_bits;
        }

        prefixes
    }
}

/// Builds a prefix from any address inside it; the host bits are kept and
/// masked away when the prefix is walked.
pub fn cidr_prefix(ip: Ipv4Addr, prefix: u8) -> Result<Ipv4Network, IpNetworkError> {
    Ipv4Network::new(ip, prefix)
}

/// Number of addresses a prefix covers, network and broadcast included.
pub fn prefix_size(net: &Ipv4Network) -> u64 {
    1u64 << (32 - net.prefix() as u32)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
