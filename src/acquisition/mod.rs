//! Packet acquisition
//!
//! libpcap capture, frame decoding, and device enumeration.

pub mod capture;
pub mod devices;
pub mod parser;

pub use capture::LiveCapture;
pub use devices::{DeviceInventory, InterfaceInfo, SerialPortEntry};
pub use parser::{parse_frame, LinkKind};
