//! # Scan Target Model
//!
//! Parses what the user typed into the address prefixes the enumerator walks.
//!
//! Supported inputs:
//! * A single IPv4 address (becomes a `/32`).
//! * An IPv4 range (e.g., `192.168.1.1-100` or `10.0.0.1-10.0.3.7`).
//! * A CIDR block (e.g., `192.168.1.0/24`).
//! * A comma separated list of any of the above.
//!
//! Order is preserved and overlapping entries are kept as they are.

use std::net::Ipv4Addr;
use std::str::FromStr;

use pnet::ipnetwork::Ipv4Network;
use thiserror::Error;

use crate::network::range::{self, Ipv4Range};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid start IP in range '{0}'")]
    RangeStart(String),
    #[error("invalid end range '{0}'")]
    RangeEnd(String),
    #[error("range '{0}' ends before it starts")]
    InvertedRange(String),
    #[error("end range has too many octets: {0}")]
    TooManyOctets(String),
    #[error("invalid IP in CIDR '{0}'")]
    CidrAddress(String),
    #[error("invalid prefix in CIDR '{0}'")]
    CidrPrefix(String),
    #[error("invalid target: {0}")]
    Unrecognized(String),
}

/// Represents a distinct target to be scanned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// A single specific host.
    Host { target_addr: Ipv4Addr },
    /// An inclusive span of IPv4 addresses.
    Range { ipv4_range: Ipv4Range },
    /// A CIDR block.
    Cidr { network: Ipv4Network },
    /// Holds a list of different targets
    Multi { targets: Vec<Target> },
}

impl FromStr for Target {
    type Err = TargetError;

    /// Parses a string into a `Target`.
    ///
    /// * **Host**: "192.168.1.5".
    /// * **Range**: "Start-End" (e.g., "192.168.1.1-50", "192.168.1.1-192.168.1.50").
    /// * **CIDR**: "Network/Prefix" (e.g., "192.168.1.0/24").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        if s.contains(',') {
            return parse_commas(s);
        }

        if let Some(target) = parse_host(s) {
            return Ok(target);
        }

        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }

        if let Some(target) = parse_cidr_range(s)? {
            return Ok(target);
        }

        Err(TargetError::Unrecognized(s.to_string()))
    }
}

impl Target {
    /// Flattens the target into prefixes, keeping input order.
    pub fn to_prefixes(&self) -> Vec<Ipv4Network> {
        let mut prefixes: Vec<Ipv4Network> = Vec::new();
        self.collect_prefixes(&mut prefixes);
        prefixes
    }

    fn collect_prefixes(&self, out: &mut Vec<Ipv4Network>) {
        match self {
            Target::Host { target_addr } => {
                if let Ok(net) = range::cidr_prefix(*target_addr, 32) {
                    out.push(net);
                }
            }
            Target::Range { ipv4_range } => out.extend(ipv4_range.to_prefixes()),
            Target::Cidr { network } => out.push(*network),
            Target::Multi { targets } => {
                for target in targets {
                    target.collect_prefixes(out);
                }
            }
        }
    }
}

/// Parses every argument and concatenates the resulting prefixes.
pub fn parse_targets<S: AsRef<str>>(inputs: &[S]) -> Result<Vec<Ipv4Network>, TargetError> {
    let mut prefixes: Vec<Ipv4Network> = Vec::new();
    for input in inputs {
        let target: Target = input.as_ref().parse()?;
        prefixes.extend(target.to_prefixes());
    }
    Ok(prefixes)
}

/// Parses a comma-separated list of targets (e.g., "192.168.1.5, 10.0.0.1-50").
fn parse_commas(s: &str) -> Result<Target, TargetError> {
    let mut targets = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        targets.push(Target::from_str(part)?);
    }

    Ok(Target::Multi { targets })
}

fn parse_host(s: &str) -> Option<Target> {
    s.parse::<Ipv4Addr>()
        .ok()
        .map(|target_addr| Target::Host { target_addr })
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<Target>, TargetError> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let start_addr = start_str
        .trim()
        .parse::<Ipv4Addr>()
        .map_err(|_| TargetError::RangeStart(start_str.to_string()))?;

    let end_addr = parse_range_end_addr(end_str.trim(), &start_addr)?;
    if start_addr > end_addr {
        return Err(TargetError::InvertedRange(s.to_string()));
    }

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    Ok(Some(Target::Range { ipv4_range }))
}

/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(end_str: &str, start_addr: &Ipv4Addr) -> Result<Ipv4Addr, TargetError> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    let mut end_octets = start_addr.octets();
    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| TargetError::RangeEnd(end_str.to_string()))?;

    if partial_octets.len() > 4 {
        return Err(TargetError::TooManyOctets(end_str.to_string()));
    }

    let start_index = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

/// Parses CIDR notation like "192.168.1.0/24".
fn parse_cidr_range(s: &str) -> Result<Option<Target>, TargetError> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|_| TargetError::CidrAddress(ip_str.to_string()))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|_| TargetError::CidrPrefix(prefix_str.to_string()))?;

    let network = range::cidr_prefix(ipv4_addr, prefix)
        .map_err(|_| TargetError::CidrPrefix(prefix_str.to_string()))?;

    Ok(Some(Target::Cidr { network }))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
