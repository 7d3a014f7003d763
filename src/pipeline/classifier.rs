//! Packet classification: category by fixed priority, direction by address.
//!
//! Pure functions only. Missing layers never panic: a packet without a
//! transport view simply fails the transport-based rules, and a packet without
//! a network view gets [`Direction::Undetermined`].

use crate::types::{
    Category, Classification, Direction, IpProtocol, LinkLayer, LocalAddressSet, Packet,
};

/// DNS and mDNS.
pub const DNS_PORTS: [u16; 2] = [53, 5353];

/// DHCPv4 server and client.
pub const DHCP_PORTS: [u16; 2] = [67, 68];

/// Classifier bound to the capture interface's addresses.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    local_addresses: LocalAddressSet,
}

impl Classifier {
    pub const fn new(local_addresses: LocalAddressSet) -> Self {
        Self { local_addresses }
    }

    pub const fn local_addresses(&self) -> &LocalAddressSet {
        &self.local_addresses
    }

    pub fn classify(&self, packet: &Packet) -> Classification {
        classify(packet, &self.local_addresses)
    }
}

/// Classify one packet.
pub fn classify(packet: &Packet, local_addresses: &LocalAddressSet) -> Classification {
    Classification::new(direction(packet, local_addresses), categorize(packet))
}

/// Category by first matching rule.
pub fn categorize(packet: &Packet) -> Category {
    let transport = packet.transport.as_ref();
    let protocol = packet.ip_protocol();
    let link = packet.link.as_ref();

    if transport.and_then(|t| t.tcp_flags()).is_some_and(|f| f.is_xmas()) {
        return Category::Anomaly;
    }
    if link.is_some_and(LinkLayer::is_lldp) {
        return Category::Lldp;
    }
    if transport.is_some_and(|t| t.touches_any_port(&DNS_PORTS)) {
        return Category::Dns;
    }
    match protocol {
        Some(IpProtocol::Icmpv4) => return Category::Icmpv4,
        Some(IpProtocol::Icmpv6) => return Category::Icmpv6,
        _ => {}
    }
    if transport.is_some_and(|t| t.is_udp() && t.touches_any_port(&DHCP_PORTS)) {
        return Category::Dhcp;
    }
    if link.is_some_and(LinkLayer::is_arp) {
        return Category::Arp;
    }
    if protocol == Some(IpProtocol::Igmp) {
        return Category::Igmp;
    }
    match transport {
        Some(t) if t.is_udp() => Category::Udp,
        Some(t) if t.is_tcp() => Category::Tcp,
        _ => Category::Other,
    }
}

/// Inbound when the destination is one of ours.
pub fn direction(packet: &Packet, local_addresses: &LocalAddressSet) -> Direction {
    match packet.network {
        None => Direction::Undetermined,
        Some(ref net) if local_addresses.contains(&net.destination) => Direction::Inbound,
        Some(_) => Direction::Outbound,
    }
}
