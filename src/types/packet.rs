//! Packet views handed from the capture task to the classifier.
//!
//! A [`Packet`] is a parsed, owned summary of one captured frame. Every layer is
//! optional: a frame that could not be decoded past the link layer simply has
//! no network or transport view, and callers must check before use.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::net::IpAddr;

// ============================================================================
// Well-known protocol numbers
// ============================================================================

/// EtherType values the classifier cares about.
pub mod ether_types {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const IPV6: u16 = 0x86DD;
    pub const LLDP: u16 = 0x88CC;
    pub const VLAN: u16 = 0x8100;
    pub const PROVIDER_BRIDGING: u16 = 0x88A8;
    pub const VLAN_DOUBLE_TAGGED: u16 = 0x9100;
}

/// IANA IP protocol numbers.
pub mod ip_numbers {
    pub const ICMPV4: u8 = 1;
    pub const IGMP: u8 = 2;
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
    pub const ICMPV6: u8 = 58;
}

// ============================================================================
// Link Layer
// ============================================================================

/// Link-layer view: the EtherType of the innermost payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkLayer {
    /// EtherType after skipping any 802.1Q / 802.1ad tags
    pub ether_type: u16,
}

impl LinkLayer {
    pub const fn new(ether_type: u16) -> Self {
        Self { ether_type }
    }

    pub const fn is_lldp(&self) -> bool {
        self.ether_type == ether_types::LLDP
    }

    pub const fn is_arp(&self) -> bool {
        self.ether_type == ether_types::ARP
    }
}

// ============================================================================
// Network Layer
// ============================================================================

/// IP protocol carried by the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpProtocol {
    Icmpv4,
    Icmpv6,
    Igmp,
    Tcp,
    Udp,
    Other(u8),
}

impl IpProtocol {
    pub const fn from_number(number: u8) -> Self {
        match number {
            ip_numbers::ICMPV4 => Self::Icmpv4,
            ip_numbers::ICMPV6 => Self::Icmpv6,
            ip_numbers::IGMP => Self::Igmp,
            ip_numbers::TCP => Self::Tcp,
            ip_numbers::UDP => Self::Udp,
            other => Self::Other(other),
        }
    }

    pub const fn number(self) -> u8 {
        match self {
            Self::Icmpv4 => ip_numbers::ICMPV4,
            Self::Icmpv6 => ip_numbers::ICMPV6,
            Self::Igmp => ip_numbers::IGMP,
            Self::Tcp => ip_numbers::TCP,
            Self::Udp => ip_numbers::UDP,
            Self::Other(n) => n,
        }
    }
}

/// Network-layer view (IPv4 or IPv6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkLayer {
    pub source: IpAddr,
    pub destination: IpAddr,
    /// Final protocol after any IPv6 extension headers
    pub protocol: IpProtocol,
}

// ============================================================================
// Transport Layer
// ============================================================================

/// TCP control bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct TcpFlags {
    pub fin: bool,
    pub syn: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack: bool,
    pub urg: bool,
    pub ece: bool,
    pub cwr: bool,
    pub ns: bool,
}

impl TcpFlags {
    /// FIN, URG and PSH together: the "Xmas tree" scan signature.
    pub const fn is_xmas(&self) -> bool {
        self.fin && self.urg && self.psh
    }
}

/// Transport-layer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    Tcp {
        source_port: u16,
        destination_port: u16,
        flags: TcpFlags,
    },
    Udp {
        source_port: u16,
        destination_port: u16,
    },
}

impl TransportLayer {
    pub const fn ports(&self) -> (u16, u16) {
        match *self {
            Self::Tcp { source_port, destination_port, .. }
            | Self::Udp { source_port, destination_port } => (source_port, destination_port),
        }
    }

    /// True if either endpoint uses one of `ports`.
    pub fn touches_any_port(&self, ports: &[u16]) -> bool {
        let (src, dst) = self.ports();
        ports.contains(&src) || ports.contains(&dst)
    }

    pub const fn tcp_flags(&self) -> Option<TcpFlags> {
        match *self {
            Self::Tcp { flags, .. } => Some(flags),
            Self::Udp { .. } => None,
        }
    }

    pub const fn is_udp(&self) -> bool {
        matches!(self, Self::Udp { .. })
    }

    pub const fn is_tcp(&self) -> bool {
        matches!(self, Self::Tcp { .. })
    }
}

// ============================================================================
// Packet
// ============================================================================

/// One captured frame, reduced to the fields classification needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub captured_at: DateTime<Utc>,
    /// Bytes captured (may be less than the wire length when snaplen truncates)
    pub captured_len: usize,
    pub link: Option<LinkLayer>,
    pub network: Option<NetworkLayer>,
    pub transport: Option<TransportLayer>,
}

impl Packet {
    /// A packet with no decoded layers.
    pub fn empty() -> Self {
        Self {
            captured_at: Utc::now(),
            captured_len: 0,
            link: None,
            network: None,
            transport: None,
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: LinkLayer) -> Self {
        self.link = Some(link);
        self
    }

    #[must_use]
    pub fn with_network(mut self, network: NetworkLayer) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: TransportLayer) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn ip_protocol(&self) -> Option<IpProtocol> {
        self.network.map(|n| n.protocol)
    }
}

// ============================================================================
// Local Address Set
// ============================================================================

/// Addresses bound to the capture interface.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalAddressSet {
    addresses: HashSet<IpAddr>,
}

impl LocalAddressSet {
    pub fn new(addresses: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.addresses.contains(addr)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addresses.iter()
    }
}

impl FromIterator<IpAddr> for LocalAddressSet {
    fn from_iter<I: IntoIterator<Item = IpAddr>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_protocol_maps_known_numbers() {
        assert_eq!(IpProtocol::from_number(1), IpProtocol::Icmpv4);
        assert_eq!(IpProtocol::from_number(58), IpProtocol::Icmpv6);
        assert_eq!(IpProtocol::from_number(2), IpProtocol::Igmp);
        assert_eq!(IpProtocol::from_number(47), IpProtocol::Other(47));
        assert_eq!(IpProtocol::Other(47).number(), 47);
    }

    #[test]
    fn xmas_requires_all_three_flags() {
        let mut flags = TcpFlags { fin: true, urg: true, ..Default::default() };
        assert!(!flags.is_xmas());
        flags.psh = true;
        assert!(flags.is_xmas());
    }

    #[test]
    fn touches_any_port_checks_both_ends() {
        let udp = TransportLayer::Udp { source_port: 53, destination_port: 40000 };
        assert!(udp.touches_any_port(&[53]));
        let udp = TransportLayer::Udp { source_port: 40000, destination_port: 53 };
        assert!(udp.touches_any_port(&[53, 5353]));
        assert!(!udp.touches_any_port(&[67, 68]));
    }

    #[test]
    fn local_address_set_membership() {
        let set: LocalAddressSet = ["192.168.1.10".parse().unwrap(), "fe80::1".parse().unwrap()]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"192.168.1.10".parse().unwrap()));
        assert!(!set.contains(&"192.168.1.11".parse().unwrap()));
    }
}
