use std::net::{Ipv4Addr, SocketAddrV4};

use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket, ipv4_checksum};

use crate::PacketError;

pub const TCP_HDR_LEN: usize = 20;
const SYN_WINDOW: u16 = 1024;

/// A SYN-ACK as seen by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SynAck {
    pub source_port: u16,
    pub destination_port: u16,
    pub acknowledgement: u32,
}

/// Writes a bare 20 byte SYN segment with a valid checksum into `buf`.
pub fn create_syn_packet(
    buf: &mut [u8],
    src: SocketAddrV4,
    dst: SocketAddrV4,
    seq: u32,
) -> Result<(), PacketError> {
    if buf.len() < TCP_HDR_LEN {
        return Err(PacketError::TcpBuffer);
    }
    let mut tcp = MutableTcpPacket::new(&mut buf[..TCP_HDR_LEN]).ok_or(PacketError::TcpBuffer)?;
    tcp.set_source(src.port());
    tcp.set_destination(dst.port());
    tcp.set_sequence(seq);
    tcp.set_acknowledgement(0);
    tcp.set_data_offset(5);
    tcp.set_flags(TcpFlags::SYN);
    tcp.set_window(SYN_WINDOW);
    tcp.set_urgent_ptr(0);

    tcp.set_checksum(0);
    let csm = ipv4_checksum(&tcp.to_immutable(), src.ip(), dst.ip());
    tcp.set_checksum(csm);
    Ok(())
}

pub fn syn_packet(src: SocketAddrV4, dst: SocketAddrV4, seq: u32) -> Result<Vec<u8>, PacketError> {
    let mut buf: Vec<u8> = vec![0u8; TCP_HDR_LEN];
    create_syn_packet(&mut buf, src, dst, seq)?;
    Ok(buf)
}

/// Reads `bytes` as a TCP segment and keeps it only if SYN and ACK are set
/// and RST is not.
pub fn parse_syn_ack(bytes: &[u8]) -> Option<SynAck> {
    let tcp = TcpPacket::new(bytes)?;
    let flags = tcp.get_flags();
    let is_syn_ack = flags & (TcpFlags::SYN | TcpFlags::ACK) == TcpFlags::SYN | TcpFlags::ACK;
    if !is_syn_ack || flags & TcpFlags::RST != 0 {
        return None;
    }
    Some(SynAck {
        source_port: tcp.get_source(),
        destination_port: tcp.get_destination(),
        acknowledgement: tcp.get_acknowledgement(),
    })
}

/// Stateless sequence number for a probe to `dst`.
///
/// A SYN-ACK acknowledges `cookie + 1`, which lets a listener tie a reply to
/// a probe without keeping per-probe sequence state.
pub fn sequence_cookie(secret: u64, dst: SocketAddrV4) -> u32 {
    let ip: u64 = u32::from(*dst.ip()) as u64;
    let mut x: u64 = secret ^ (ip << 16) ^ dst.port() as u64;
    // splitmix64 finalizer
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^= x >> 31;
    x as u32
}

/// The endpoint a SYN-ACK came from, if it answers one of our probes.
pub fn correlate(
    secret: u64,
    local_port: u16,
    remote: Ipv4Addr,
    reply: &SynAck,
) -> Option<SocketAddrV4> {
    if reply.destination_port != local_port {
        return None;
    }
    let endpoint = SocketAddrV4::new(remote, reply.source_port);
    let expected = sequence_cookie(secret, endpoint).wrapping_add(1);
    (reply.acknowledgement == expected).then_some(endpoint)
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

    const SECRET: u64 = 0x5eed_cafe_f00d_0001;

    fn local() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 20), 41000)
    }

    fn remote() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 1080)
    }

    /// Builds the reply a listening host would send for `seq`.
    fn reply(from: SocketAddrV4, to: SocketAddrV4, ack: u32, flags: u8) -> Vec<u8> {
        let mut buf = vec![0u8; TCP_HDR_LEN];
        let mut tcp = MutableTcpPacket::new(&mut buf).unwrap();
        tcp.set_source(from.port());
        tcp.set_destination(to.port());
        tcp.set_sequence(99);
        tcp.set_acknowledgement(ack);
        tcp.set_data_offset(5);
        tcp.set_flags(flags);
        buf
    }

    #[test]
    fn syn_packet_has_syn_only_and_valid_checksum() {
        let bytes = syn_packet(local(), remote(), 1234).unwrap();
        let tcp = TcpPacket::new(&bytes).unwrap();
        assert_eq!(tcp.get_flags(), TcpFlags::SYN);
        assert_eq!(tcp.get_source(), 41000);
        assert_eq!(tcp.get_destination(), 1080);
        assert_eq!(tcp.get_sequence(), 1234);
        assert_eq!(
            tcp.get_checksum(),
            ipv4_checksum(&tcp, local().ip(), remote().ip())
        );
    }

    #[test]
    fn syn_ack_is_parsed_and_rst_is_not() {
        let bytes = reply(remote(), local(), 5, TcpFlags::SYN | TcpFlags::ACK);
        assert_eq!(
            parse_syn_ack(&bytes),
            Some(SynAck {
                source_port: 1080,
                destination_port: 41000,
                acknowledgement: 5
            })
        );

        let rst = reply(remote(), local(), 5, TcpFlags::RST | TcpFlags::ACK);
        assert_eq!(parse_syn_ack(&rst), None);

        let bare_syn = reply(remote(), local(), 5, TcpFlags::SYN);
        assert_eq!(parse_syn_ack(&bare_syn), None);
    }

    #[test]
    fn cookie_depends_on_endpoint_and_secret() {
        let a = sequence_cookie(SECRET, remote());
        assert_eq!(a, sequence_cookie(SECRET, remote()));
        assert_ne!(a, sequence_cookie(SECRET ^ 1, remote()));
        assert_ne!(a, sequence_cookie(SECRET, SocketAddrV4::new(*remote().ip(), 1081)));
    }

    #[test]
    fn correlate_accepts_only_matching_ack() {
        let ack = sequence_cookie(SECRET, remote()).wrapping_add(1);
        let ok = SynAck {
            source_port: 1080,
            destination_port: 41000,
            acknowledgement: ack,
        };
        assert_eq!(correlate(SECRET, 41000, *remote().ip(), &ok), Some(remote()));

        let wrong_port = SynAck {
            destination_port: 41001,
            ..ok
        };
        assert_eq!(correlate(SECRET, 41000, *remote().ip(), &wrong_port), None);

        let wrong_ack = SynAck {
            acknowledgement: ack.wrapping_add(1),
            ..ok
        };
        assert_eq!(correlate(SECRET, 41000, *remote().ip(), &wrong_ack), None);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut buf = [0u8; 4];
        assert_eq!(
            create_syn_packet(&mut buf, local(), remote(), 0),
            Err(PacketError::TcpBuffer)
        );
    }
}
