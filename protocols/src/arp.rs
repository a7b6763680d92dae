use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::util::MacAddr;

use crate::PacketError;
use crate::ethernet::{self, ETH_HDR_LEN};

pub const ARP_LEN: usize = 28;
/// Ethernet minimum frame size without FCS; ARP frames are padded up to it.
pub const MIN_ETH_FRAME_NO_FCS: usize = 60;

/// Broadcast "who has `target_addr`" frame.
pub fn create_request(
    src_mac: MacAddr,
    src_addr: Ipv4Addr,
    target_addr: Ipv4Addr,
) -> Result<Vec<u8>, PacketError> {
    let mut buffer: Vec<u8> = vec![0u8; MIN_ETH_FRAME_NO_FCS];
    ethernet::make_header(&mut buffer, src_mac, MacAddr::broadcast(), EtherTypes::Arp)?;

    let mut arp = MutableArpPacket::new(&mut buffer[ETH_HDR_LEN..ETH_HDR_LEN + ARP_LEN])
        .ok_or(PacketError::ArpBuffer)?;
    arp.set_hardware_type(ArpHardwareTypes::Ethernet);
    arp.set_protocol_type(EtherTypes::Ipv4);
    arp.set_hw_addr_len(6);
    arp.set_proto_addr_len(4);
    arp.set_operation(ArpOperations::Request);
    arp.set_sender_hw_addr(src_mac);
    arp.set_target_hw_addr(MacAddr::zero());
    arp.set_sender_proto_addr(src_addr);
    arp.set_target_proto_addr(target_addr);

    Ok(buffer)
}

/// Sender address and MAC of an ARP reply frame.
pub fn parse_any_reply(frame: &[u8]) -> Option<(Ipv4Addr, MacAddr)> {
    let eth = EthernetPacket::new(frame)?;
    if eth.get_ethertype() != EtherTypes::Arp {
        return None;
    }
    let arp = ArpPacket::new(eth.payload())?;
    if arp.get_operation() != ArpOperations::Reply {
        return None;
    }
    Some((arp.get_sender_proto_addr(), arp.get_sender_hw_addr()))
}

/// Returns the sender MAC if `frame` is an ARP reply from `expected_addr`.
pub fn parse_reply(frame: &[u8], expected_addr: Ipv4Addr) -> Option<MacAddr> {
    parse_any_reply(frame)
        .filter(|(sender, _)| *sender == expected_addr)
        .map(|(_, mac)| mac)
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
    use pnet::packet::ethernet::MutableEthernetPacket;

    const GATEWAY_MAC: MacAddr = MacAddr(0x02, 0x42, 0xac, 0x11, 0x00, 0x01);

    fn mock_reply(sender_ip: Ipv4Addr, op: pnet::packet::arp::ArpOperation) -> Vec<u8> {
        let mut buffer = vec![0u8; MIN_ETH_FRAME_NO_FCS];
        {
            let mut eth = MutableEthernetPacket::new(&mut buffer).unwrap();
            eth.set_destination(MacAddr::new(0x02, 0, 0, 0, 0, 9));
            eth.set_source(GATEWAY_MAC);
            eth.set_ethertype(EtherTypes::Arp);
        }
        let mut arp = MutableArpPacket::new(&mut buffer[ETH_HDR_LEN..ETH_HDR_LEN + ARP_LEN]).unwrap();
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(op);
        arp.set_sender_hw_addr(GATEWAY_MAC);
        arp.set_sender_proto_addr(sender_ip);
        arp.set_target_hw_addr(MacAddr::new(0x02, 0, 0, 0, 0, 9));
        arp.set_target_proto_addr(Ipv4Addr::new(192, 168, 1, 20));
        buffer
    }

    #[test]
    fn request_is_broadcast_with_target() {
        let src_mac = MacAddr::new(0x01, 0x02, 0x03, 0x04, 0x05, 0x06);
        let src_addr = Ipv4Addr::new(192, 168, 1, 10);
        let target = Ipv4Addr::new(192, 168, 1, 1);

        let buffer = create_request(src_mac, src_addr, target).unwrap();
        assert_eq!(buffer.len(), MIN_ETH_FRAME_NO_FCS);

        let eth = EthernetPacket::new(&buffer).unwrap();
        assert_eq!(eth.get_destination(), MacAddr::broadcast());
        assert_eq!(eth.get_ethertype(), EtherTypes::Arp);

        let arp = ArpPacket::new(eth.payload()).unwrap();
        assert_eq!(arp.get_operation(), ArpOperations::Request);
        assert_eq!(arp.get_sender_hw_addr(), src_mac);
        assert_eq!(arp.get_sender_proto_addr(), src_addr);
        assert_eq!(arp.get_target_proto_addr(), target);
    }

    #[test]
    fn reply_from_expected_sender_yields_mac() {
        let gw = Ipv4Addr::new(192, 168, 1, 1);
        let frame = mock_reply(gw, ArpOperations::Reply);
        assert_eq!(parse_reply(&frame, gw), Some(GATEWAY_MAC));
    }

    #[test]
    fn other_senders_and_requests_are_ignored() {
        let gw = Ipv4Addr::new(192, 168, 1, 1);
        let other = mock_reply(Ipv4Addr::new(192, 168, 1, 7), ArpOperations::Reply);
        assert_eq!(parse_reply(&other, gw), None);

        let request = mock_reply(gw, ArpOperations::Request);
        assert_eq!(parse_reply(&request, gw), None);

        let mut not_arp = mock_reply(gw, ArpOperations::Reply);
        MutableEthernetPacket::new(&mut not_arp)
            .unwrap()
            .set_ethertype(EtherTypes::Ipv4);
        assert_eq!(parse_reply(&not_arp, gw), None);
    }

    #[test]
    fn any_reply_reports_its_sender() {
        let host = Ipv4Addr::new(192, 168, 1, 7);
        let frame = mock_reply(host, ArpOperations::Reply);
        assert_eq!(parse_any_reply(&frame), Some((host, GATEWAY_MAC)));

        let request = mock_reply(host, ArpOperations::Request);
        assert_eq!(parse_any_reply(&request), None);
    }
}
