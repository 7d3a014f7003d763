//! Capture interface and serial port enumeration.
//!
//! Backs the `netlamp devices` listing and resolves the local address set
//! for the chosen interface. Selectors may be a name or the index shown in
//! the listing.

use serde::Serialize;
use std::net::IpAddr;

use crate::pipeline::source::CaptureError;
use crate::types::LocalAddressSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub addresses: Vec<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SerialPortEntry {
    pub name: String,
    /// "usb", "pci", "bluetooth" or "unknown"
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

/// Everything `netlamp devices` prints.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceInventory {
    pub interfaces: Vec<InterfaceInfo>,
    pub serial_ports: Vec<SerialPortEntry>,
}

impl std::fmt::Display for DeviceInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Capture interfaces:")?;
        if self.interfaces.is_empty() {
            writeln!(f, "  (none; capture may need elevated privileges)")?;
        }
        for (i, iface) in self.interfaces.iter().enumerate() {
            match iface.description {
                Some(ref d) => writeln!(f, "  {i}. {} ({d})", iface.name)?,
                None => writeln!(f, "  {i}. {}", iface.name)?,
            }
            for addr in &iface.addresses {
                writeln!(f, "       IP address: {addr}")?;
            }
        }
        writeln!(f)?;
        writeln!(f, "Serial ports:")?;
        if self.serial_ports.is_empty() {
            writeln!(f, "  (none)")?;
        }
        for (i, port) in self.serial_ports.iter().enumerate() {
            match port.product {
                Some(ref p) => writeln!(f, "  {i}. {} [{}] {p}", port.name, port.kind)?,
                None => writeln!(f, "  {i}. {} [{}]", port.name, port.kind)?,
            }
        }
        Ok(())
    }
}

/// All capture interfaces libpcap can see.
pub fn list_interfaces() -> Result<Vec<InterfaceInfo>, CaptureError> {
    let devices = pcap::Device::list().map_err(CaptureError::Enumerate)?;
    Ok(devices
        .into_iter()
        .map(|d| InterfaceInfo {
            name: d.name,
            description: d.desc,
            addresses: d.addresses.into_iter().map(|a| a.addr).collect(),
        })
        .collect())
}

/// All serial ports the OS reports.
pub fn list_serial_ports() -> Result<Vec<SerialPortEntry>, serialport::Error> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let (kind, product) = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => ("usb", usb.product),
                serialport::SerialPortType::PciPort => ("pci", None),
                serialport::SerialPortType::BluetoothPort => ("bluetooth", None),
                serialport::SerialPortType::Unknown => ("unknown", None),
            };
            SerialPortEntry {
                name: p.port_name,
                kind,
                product,
            }
        })
        .collect())
}

/// Both listings. Serial enumeration failure is logged, not fatal.
pub fn inventory() -> Result<DeviceInventory, CaptureError> {
    let interfaces = list_interfaces()?;
    let serial_ports = list_serial_ports().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Serial port enumeration failed");
        Vec::new()
    });
    Ok(DeviceInventory {
        interfaces,
        serial_ports,
    })
}

/// Find an interface by exact name, then by listing index.
pub fn resolve_interface<'a>(
    interfaces: &'a [InterfaceInfo],
    selector: &str,
) -> Result<&'a InterfaceInfo, CaptureError> {
    interfaces
        .iter()
        .find(|i| i.name == selector)
        .or_else(|| selector.parse::<usize>().ok().and_then(|n| interfaces.get(n)))
        .ok_or_else(|| CaptureError::UnknownInterface(selector.to_string()))
}

/// Serial device path for a selector: a listed port name or index, otherwise
/// the selector itself (ports the OS does not enumerate, e.g. pseudo-ttys).
pub fn resolve_serial_port(ports: &[SerialPortEntry], selector: &str) -> String {
    if ports.iter().any(|p| p.name == selector) {
        return selector.to_string();
    }
    selector
        .parse::<usize>()
        .ok()
        .and_then(|n| ports.get(n))
        .map_or_else(|| selector.to_string(), |p| p.name.clone())
}

impl InterfaceInfo {
    pub fn local_addresses(&self) -> LocalAddressSet {
        self.addresses.iter().copied().collect()
    }
}
