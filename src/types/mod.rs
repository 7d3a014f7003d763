//! Core data types shared by the capture, classification and output stages.

mod classification;
mod packet;

pub use classification::{Category, Classification, Direction, WIRE_CATEGORY_COUNT};
pub use packet::{
    ether_types, ip_numbers, IpProtocol, LinkLayer, LocalAddressSet, NetworkLayer, Packet,
    TcpFlags, TransportLayer,
};
