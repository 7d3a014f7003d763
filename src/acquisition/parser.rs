//! Raw frame -> [`Packet`] decoding.
//!
//! The link header is read by hand so VLAN tags and non-IP EtherTypes (ARP,
//! LLDP) survive; everything from the IP header up is sliced by `etherparse`
//! in lax mode, so frames cut short by the snapshot length and IPv4 headers
//! with a zero total length (segmentation offload) still decode. Anything
//! that fails to decode just leaves the corresponding layer empty.

use chrono::{DateTime, Utc};
use etherparse::{Ethernet2HeaderSlice, LaxNetSlice, LaxSlicedPacket, TransportSlice};
use std::net::IpAddr;

use crate::types::{
    ether_types, ip_numbers, IpProtocol, LinkLayer, NetworkLayer, Packet, TcpFlags,
    TransportLayer,
};

/// Length of one 802.1Q / 802.1ad tag.
const VLAN_TAG_LEN: usize = 4;
/// Linux cooked capture (v1) header length.
const SLL_HEADER_LEN: usize = 16;
/// BSD loopback address-family header length.
const NULL_HEADER_LEN: usize = 4;
/// Tags skipped before giving up on the link layer.
const MAX_VLAN_TAGS: usize = 2;

/// How to find the network header in a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// DLT_EN10MB
    Ethernet,
    /// DLT_LINUX_SLL (the `any` pseudo-device)
    LinuxSll,
    /// DLT_NULL / DLT_LOOP
    Loopback,
    /// DLT_RAW, DLT_IPV4, DLT_IPV6
    RawIp,
    /// Anything else; packets get no layers.
    Unsupported(i32),
}

impl LinkKind {
    pub fn from_linktype(linktype: pcap::Linktype) -> Self {
        match linktype {
            pcap::Linktype::ETHERNET => Self::Ethernet,
            pcap::Linktype::LINUX_SLL => Self::LinuxSll,
            pcap::Linktype::NULL | pcap::Linktype::LOOP => Self::Loopback,
            pcap::Linktype::RAW | pcap::Linktype::IPV4 | pcap::Linktype::IPV6 => Self::RawIp,
            pcap::Linktype(other) => Self::Unsupported(other),
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ethernet => write!(f, "Ethernet"),
            Self::LinuxSll => write!(f, "Linux cooked"),
            Self::Loopback => write!(f, "loopback"),
            Self::RawIp => write!(f, "raw IP"),
            Self::Unsupported(n) => write!(f, "unsupported link type {n}"),
        }
    }
}

/// Decode one captured frame.
pub fn parse_frame(kind: LinkKind, data: &[u8], captured_at: DateTime<Utc>) -> Packet {
    let mut packet = Packet::empty();
    packet.captured_at = captured_at;
    packet.captured_len = data.len();

    let (link, payload) = match kind {
        LinkKind::Ethernet => match ethernet_link(data) {
            Some((ether_type, offset)) => (Some(LinkLayer::new(ether_type)), &data[offset..]),
            None => return packet,
        },
        LinkKind::LinuxSll => match data.get(SLL_HEADER_LEN - 2..SLL_HEADER_LEN) {
            Some(&[hi, lo]) => (
                Some(LinkLayer::new(u16::from_be_bytes([hi, lo]))),
                &data[SLL_HEADER_LEN..],
            ),
            _ => return packet,
        },
        LinkKind::Loopback => match data.get(..NULL_HEADER_LEN) {
            Some(family) if is_loopback_ip_family(family) => (None, &data[NULL_HEADER_LEN..]),
            _ => return packet,
        },
        LinkKind::RawIp => (None, data),
        LinkKind::Unsupported(_) => return packet,
    };

    packet.link = link;
    let carries_ip = link.map_or(true, |l| {
        l.ether_type == ether_types::IPV4 || l.ether_type == ether_types::IPV6
    });
    if carries_ip {
        decode_ip(&mut packet, payload);
    }
    packet
}

/// EtherType of the innermost payload and the offset where it starts.
fn ethernet_link(data: &[u8]) -> Option<(u16, usize)> {
    let header = Ethernet2HeaderSlice::from_slice(data).ok()?;
    let mut ether_type = header.ether_type().0;
    let mut offset = header.slice().len();

    for _ in 0..MAX_VLAN_TAGS {
        if !is_vlan_tag(ether_type) {
            break;
        }
        // Tag control (2 bytes) then the encapsulated EtherType.
        let inner = data.get(offset + 2..offset + VLAN_TAG_LEN)?;
        ether_type = u16::from_be_bytes([inner[0], inner[1]]);
        offset += VLAN_TAG_LEN;
    }
    Some((ether_type, offset))
}

const fn is_vlan_tag(ether_type: u16) -> bool {
    matches!(
        ether_type,
        ether_types::VLAN | ether_types::PROVIDER_BRIDGING | ether_types::VLAN_DOUBLE_TAGGED
    )
}

/// AF_INET (2) or one of the platform AF_INET6 values (10, 24, 28, 30),
/// in either byte order.
fn is_loopback_ip_family(header: &[u8]) -> bool {
    let Ok(bytes) = <[u8; NULL_HEADER_LEN]>::try_from(header) else {
        return false;
    };
    [u32::from_le_bytes(bytes), u32::from_be_bytes(bytes)]
        .iter()
        .any(|family| matches!(family, 2 | 10 | 24 | 28 | 30))
}

fn decode_ip(packet: &mut Packet, payload: &[u8]) {
    let Ok(sliced) = LaxSlicedPacket::from_ip(payload) else {
        return;
    };

    let header_protocol = match &sliced.net {
        Some(LaxNetSlice::Ipv4(ipv4)) => {
            let h = ipv4.header();
            Some((IpAddr::from(h.source_addr()), IpAddr::from(h.destination_addr()), h.protocol().0))
        }
        Some(LaxNetSlice::Ipv6(ipv6)) => {
            let h = ipv6.header();
            Some((IpAddr::from(h.source_addr()), IpAddr::from(h.destination_addr()), h.next_header().0))
        }
        _ => None,
    };
    let Some((source, destination, header_number)) = header_protocol else {
        return;
    };

    // IPv6 extension headers hide the real protocol from `next_header`.
    let number = match &sliced.transport {
        Some(TransportSlice::Tcp(_)) => ip_numbers::TCP,
        Some(TransportSlice::Udp(_)) => ip_numbers::UDP,
        Some(TransportSlice::Icmpv4(_)) => ip_numbers::ICMPV4,
        Some(TransportSlice::Icmpv6(_)) => ip_numbers::ICMPV6,
        _ => header_number,
    };
    packet.network = Some(NetworkLayer {
        source,
        destination,
        protocol: IpProtocol::from_number(number),
    });

    packet.transport = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => Some(TransportLayer::Tcp {
            source_port: tcp.source_port(),
            destination_port: tcp.destination_port(),
            flags: TcpFlags {
                fin: tcp.fin(),
                syn: tcp.syn(),
                rst: tcp.rst(),
                psh: tcp.psh(),
                ack: tcp.ack(),
                urg: tcp.urg(),
                ece: tcp.ece(),
                cwr: tcp.cwr(),
                ns: tcp.ns(),
            },
        }),
        Some(TransportSlice::Udp(udp)) => Some(TransportLayer::Udp {
            source_port: udp.source_port(),
            destination_port: udp.destination_port(),
        }),
        _ => None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::classifier::classify;
    use crate::types::{Category, Classification, Direction, LocalAddressSet};
    use etherparse::PacketBuilder;
    use std::net::Ipv4Addr;

    const SRC_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
    const DST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 2];

    fn udp_frame(src_port: u16, dst_port: u16) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .udp(src_port, dst_port);
        let payload = [1u8, 2, 3, 4];
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, &payload).unwrap();
        out
    }

    fn ethernet_header(ether_type: u16) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend_from_slice(&DST_MAC);
        v.extend_from_slice(&SRC_MAC);
        v.extend_from_slice(&ether_type.to_be_bytes());
        v
    }

    #[test]
    fn maps_pcap_link_types() {
        assert_eq!(LinkKind::from_linktype(pcap::Linktype::ETHERNET), LinkKind::Ethernet);
        assert_eq!(LinkKind::from_linktype(pcap::Linktype::RAW), LinkKind::RawIp);
        assert_eq!(LinkKind::from_linktype(pcap::Linktype::NULL), LinkKind::Loopback);
        assert_eq!(LinkKind::from_linktype(pcap::Linktype(147)), LinkKind::Unsupported(147));
    }

    #[test]
    fn ethernet_udp_frame() {
        let frame = udp_frame(5000, 53);
        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());
        assert_eq!(p.link, Some(LinkLayer::new(ether_types::IPV4)));
        let net = p.network.unwrap();
        assert_eq!(net.source, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(net.destination, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert_eq!(net.protocol, IpProtocol::Udp);
        assert_eq!(p.transport.unwrap().ports(), (5000, 53));
        assert_eq!(p.captured_len, frame.len());
    }

    #[test]
    fn tcp_flags_are_carried() {
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(40000, 80, 1, 1024)
            .fin()
            .urg(0)
            .psh();
        let mut frame = Vec::new();
        builder.write(&mut frame, &[]).unwrap();

        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());
        let flags = p.transport.unwrap().tcp_flags().unwrap();
        assert!(flags.is_xmas());
        assert!(!flags.syn);
    }

    #[test]
    fn arp_keeps_link_layer_only() {
        let mut frame = ethernet_header(ether_types::ARP);
        frame.extend_from_slice(&[0u8; 28]);
        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());
        assert_eq!(p.link, Some(LinkLayer::new(ether_types::ARP)));
        assert!(p.network.is_none());
        assert!(p.transport.is_none());
    }

    #[test]
    fn vlan_tagged_lldp() {
        let mut frame = ethernet_header(ether_types::VLAN);
        frame.extend_from_slice(&[0x00, 0x64]);
        frame.extend_from_slice(&ether_types::LLDP.to_be_bytes());
        frame.extend_from_slice(&[0u8; 20]);
        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());
        assert_eq!(p.link, Some(LinkLayer::new(ether_types::LLDP)));
    }

    #[test]
    fn double_tagged_ipv4() {
        let inner = udp_frame(1234, 4321);
        let mut frame = ethernet_header(ether_types::PROVIDER_BRIDGING);
        frame.extend_from_slice(&[0x00, 0x0a]);
        frame.extend_from_slice(&ether_types::VLAN.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x14]);
        frame.extend_from_slice(&ether_types::IPV4.to_be_bytes());
        frame.extend_from_slice(&inner[14..]);

        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());
        assert_eq!(p.link, Some(LinkLayer::new(ether_types::IPV4)));
        assert_eq!(p.transport.unwrap().ports(), (1234, 4321));
    }

    #[test]
    fn raw_ip_has_no_link_layer() {
        let frame = udp_frame(9, 9);
        let p = parse_frame(LinkKind::RawIp, &frame[14..], Utc::now());
        assert!(p.link.is_none());
        assert_eq!(p.ip_protocol(), Some(IpProtocol::Udp));
    }

    #[test]
    fn loopback_family_header() {
        let frame = udp_frame(9, 9);
        let mut lo = 2u32.to_le_bytes().to_vec();
        lo.extend_from_slice(&frame[14..]);
        let p = parse_frame(LinkKind::Loopback, &lo, Utc::now());
        assert_eq!(p.ip_protocol(), Some(IpProtocol::Udp));
    }

    #[test]
    fn truncated_and_unsupported_frames_yield_empty_layers() {
        let p = parse_frame(LinkKind::Ethernet, &[0u8; 6], Utc::now());
        assert!(p.link.is_none() && p.network.is_none());

        let mut frame = ethernet_header(ether_types::VLAN);
        frame.push(0);
        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());
        assert!(p.link.is_none());

        let p = parse_frame(LinkKind::Unsupported(127), &udp_frame(1, 2), Utc::now());
        assert!(p.link.is_none() && p.network.is_none());
    }

    /// Ethernet + IPv4 + UDP/53 from a remote host to 192.168.1.10.
    fn dns_response(payload_len: usize) -> Vec<u8> {
        let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
            .ipv4([203, 0, 113, 9], [192, 168, 1, 10], 64)
            .udp(53, 41000);
        let payload = vec![0xabu8; payload_len];
        let mut out = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut out, &payload).unwrap();
        out
    }

    fn local_set() -> LocalAddressSet {
        LocalAddressSet::new([IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))])
    }

    #[test]
    fn frame_cut_by_snaplen_still_classifies() {
        let frame = dns_response(1200);
        let p = parse_frame(LinkKind::Ethernet, &frame[..128], Utc::now());

        assert_eq!(p.captured_len, 128);
        assert_eq!(p.ip_protocol(), Some(IpProtocol::Udp));
        assert_eq!(p.transport.unwrap().ports(), (53, 41000));
        assert_eq!(
            classify(&p, &local_set()),
            Classification::new(Direction::Inbound, Category::Dns)
        );
    }

    #[test]
    fn zero_ipv4_total_length_still_classifies() {
        let mut frame = dns_response(32);
        // IPv4 total length sits two bytes into the IP header.
        frame[16] = 0;
        frame[17] = 0;
        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());

        let net = p.network.unwrap();
        assert_eq!(net.destination, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(
            classify(&p, &local_set()),
            Classification::new(Direction::Inbound, Category::Dns)
        );
    }

    #[test]
    fn malformed_ip_payload_keeps_link_layer() {
        let mut frame = ethernet_header(ether_types::IPV4);
        frame.extend_from_slice(&[0x45, 0x00]);
        let p = parse_frame(LinkKind::Ethernet, &frame, Utc::now());
        assert_eq!(p.link, Some(LinkLayer::new(ether_types::IPV4)));
        assert!(p.network.is_none());
    }
}
