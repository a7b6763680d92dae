//! Packet codecs used by the SYN-based liveness detectors.
//!
//! Builders write into caller-visible buffers with `pnet`'s mutable packet
//! views; parsers return `None` for anything that is not the reply they look
//! for, since a capture sees plenty of unrelated traffic.

pub mod arp;
pub mod ethernet;
pub mod ipv4;
pub mod tcp;

use std::net::SocketAddrV4;

use pnet::packet::ethernet::EtherTypes;
use pnet::util::MacAddr;
use thiserror::Error;

pub use ethernet::ETH_HDR_LEN;
pub use ipv4::IPV4_HDR_LEN;
pub use tcp::TCP_HDR_LEN;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too small for ethernet header")]
    EthernetBuffer,
    #[error("buffer too small for ARP payload")]
    ArpBuffer,
    #[error("buffer too small for IPv4 header")]
    Ipv4Buffer,
    #[error("buffer too small for TCP header")]
    TcpBuffer,
}

/// Length of an Ethernet frame carrying a bare SYN.
pub const SYN_FRAME_LEN: usize = ETH_HDR_LEN + IPV4_HDR_LEN + TCP_HDR_LEN;

/// Builds a complete Ethernet/IPv4/TCP SYN frame for link-layer injection.
pub fn create_syn_frame(
    src_mac: MacAddr,
    dst_mac: MacAddr,
    src: SocketAddrV4,
    dst: SocketAddrV4,
    seq: u32,
) -> Result<Vec<u8>, PacketError> {
    let mut frame: Vec<u8> = vec![0u8; SYN_FRAME_LEN];

    ethernet::make_header(&mut frame, src_mac, dst_mac, EtherTypes::Ipv4)?;
    ipv4::create_tcp_header(
        &mut frame[ETH_HDR_LEN..ETH_HDR_LEN + IPV4_HDR_LEN],
        (IPV4_HDR_LEN + TCP_HDR_LEN) as u16,
        *src.ip(),
        *dst.ip(),
    )?;
    tcp::create_syn_packet(&mut frame[ETH_HDR_LEN + IPV4_HDR_LEN..], src, dst, seq)?;

    Ok(frame)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
