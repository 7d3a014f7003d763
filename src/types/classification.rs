//! Classification results and their wire codes.

use serde::{Deserialize, Serialize};

/// Whether a packet was addressed to this host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Destination address is bound to the capture interface
    Inbound,
    /// Destination address is not local
    Outbound,
    /// No network layer to compare against
    Undetermined,
}

impl Direction {
    /// Direction byte sent to the indicator device.
    ///
    /// The device only knows received (0) and sent (1); undetermined frames
    /// are reported as sent.
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Inbound => 0,
            Self::Outbound | Self::Undetermined => 1,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Inbound => "Receive",
            Self::Outbound => "Send",
            Self::Undetermined => "Unknown",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Traffic category, in classifier priority order.
///
/// ICMPv4 and ICMPv6 are kept apart for logging but share one wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Other,
    Anomaly,
    Lldp,
    Dns,
    Icmpv4,
    Icmpv6,
    Dhcp,
    Arp,
    Igmp,
    Udp,
    Tcp,
}

/// Number of distinct category bytes on the wire.
pub const WIRE_CATEGORY_COUNT: usize = 10;

impl Category {
    pub const ALL: [Self; 11] = [
        Self::Other,
        Self::Anomaly,
        Self::Lldp,
        Self::Dns,
        Self::Icmpv4,
        Self::Icmpv6,
        Self::Dhcp,
        Self::Arp,
        Self::Igmp,
        Self::Udp,
        Self::Tcp,
    ];

    /// Category byte sent to the indicator device (0-9).
    pub const fn wire_code(self) -> u8 {
        match self {
            Self::Other => 0,
            Self::Anomaly => 1,
            Self::Lldp => 2,
            Self::Dns => 3,
            Self::Icmpv4 | Self::Icmpv6 => 4,
            Self::Dhcp => 5,
            Self::Arp => 6,
            Self::Igmp => 7,
            Self::Udp => 8,
            Self::Tcp => 9,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Other => "others",
            Self::Anomaly => "Anomaly",
            Self::Lldp => "LLDP",
            Self::Dns => "DNS",
            Self::Icmpv4 => "ICMPv4",
            Self::Icmpv6 => "ICMPv6",
            Self::Dhcp => "DHCPv4",
            Self::Arp => "ARP",
            Self::Igmp => "IGMP",
            Self::Udp => "UDP",
            Self::Tcp => "TCP",
        }
    }

    /// Lamp color the device firmware shows for this category.
    pub const fn indicator_color(self) -> &'static str {
        match self {
            Self::Other => "White",
            Self::Anomaly => "Red",
            Self::Lldp => "Green",
            Self::Dns => "Lime",
            Self::Icmpv4 | Self::Icmpv6 => "Pink",
            Self::Dhcp => "Cyan",
            Self::Arp => "Purple",
            Self::Igmp => "Orange",
            Self::Udp => "Yellow",
            Self::Tcp => "Blue",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub direction: Direction,
    pub category: Category,
}

impl Classification {
    pub const fn new(direction: Direction, category: Category) -> Self {
        Self { direction, category }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) {}",
            self.category,
            self.category.indicator_color(),
            self.direction
        )
    }
}
