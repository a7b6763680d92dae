use std::net::Ipv4Addr;

use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Packet, MutableIpv4Packet, checksum};

use crate::PacketError;

pub const IPV4_HDR_LEN: usize = 20;

/// Writes a 20 byte IPv4 header for a TCP payload into `buf`.
pub fn create_tcp_header(
    buf: &mut [u8],
    total_length: u16,
    src_addr: Ipv4Addr,
    dst_addr: Ipv4Addr,
) -> Result<(), PacketError> {
    if buf.len() < IPV4_HDR_LEN {
        return Err(PacketError::Ipv4Buffer);
    }
    let mut ipv4 =
        MutableIpv4Packet::new(&mut buf[..IPV4_HDR_LEN]).ok_or(PacketError::Ipv4Buffer)?;
    ipv4.set_version(4);
    ipv4.set_header_length(5); // 5 × 32 bits, no options
    ipv4.set_dscp(0);
    ipv4.set_ecn(0);
    ipv4.set_total_length(total_length);
    ipv4.set_identification(rand::random());
    ipv4.set_flags(2); // Do not fragment (010)
    ipv4.set_fragment_offset(0);
    ipv4.set_ttl(64);
    ipv4.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
    ipv4.set_source(src_addr);
    ipv4.set_destination(dst_addr);

    ipv4.set_checksum(0);
    let csm = checksum(&ipv4.to_immutable());
    ipv4.set_checksum(csm);
    Ok(())
}

/// Extracts the TCP segment of an IPv4 packet addressed to `local`.
///
/// Returns the remote source address and the segment bytes.
pub fn tcp_segment_for(bytes: &[u8], local: Ipv4Addr) -> Option<(Ipv4Addr, &[u8])> {
    let packet = Ipv4Packet::new(bytes)?;
    if packet.get_version() != 4
        || packet.get_next_level_protocol() != IpNextHeaderProtocols::Tcp
        || packet.get_destination() != local
    {
        return None;
    }

    let header_len: usize = packet.get_header_length() as usize * 4;
    let total_len: usize = (packet.get_total_length() as usize).min(bytes.len());
    let segment: &[u8] = bytes.get(header_len..total_len)?;

    Some((packet.get_source(), segment))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
