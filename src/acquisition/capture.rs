//! Live libpcap capture.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::parser::{parse_frame, LinkKind};
use crate::config::CaptureConfig;
use crate::pipeline::source::{CaptureError, CaptureEvent, CaptureSource};

/// An open capture handle on one interface.
pub struct LiveCapture {
    interface: String,
    link_kind: LinkKind,
    capture: pcap::Capture<pcap::Active>,
}

impl std::fmt::Debug for LiveCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveCapture")
            .field("interface", &self.interface)
            .field("link_kind", &self.link_kind)
            .finish_non_exhaustive()
    }
}

impl LiveCapture {
    /// Open `interface` with the configured snaplen, promiscuity and read
    /// timeout.
    pub fn open(interface: &str, config: &CaptureConfig) -> Result<Self, CaptureError> {
        let open_err = |source| CaptureError::Open {
            interface: interface.to_string(),
            source,
        };
        let capture = pcap::Capture::from_device(interface)
            .map_err(open_err)?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.read_timeout_ms)
            .open()
            .map_err(open_err)?;

        let linktype = capture.get_datalink();
        let link_kind = LinkKind::from_linktype(linktype);
        if let LinkKind::Unsupported(code) = link_kind {
            warn!(
                interface,
                linktype = code,
                "Link type not understood; every packet will classify as 'others'"
            );
        }
        info!(
            interface,
            link = %link_kind,
            snaplen = config.snaplen,
            promiscuous = config.promiscuous,
            "Capture opened"
        );

        Ok(Self {
            interface: interface.to_string(),
            link_kind,
            capture,
        })
    }

    pub const fn link_kind(&self) -> LinkKind {
        self.link_kind
    }

    /// Kernel-side counters (received / dropped by libpcap).
    pub fn kernel_stats(&mut self) -> Option<pcap::Stat> {
        self.capture.stats().ok()
    }
}

impl CaptureSource for LiveCapture {
    fn next_packet(&mut self) -> Result<CaptureEvent, CaptureError> {
        match self.capture.next_packet() {
            Ok(raw) => {
                let captured_at = header_timestamp(raw.header);
                Ok(CaptureEvent::Packet(parse_frame(self.link_kind, raw.data, captured_at)))
            }
            Err(pcap::Error::TimeoutExpired) => Ok(CaptureEvent::Timeout),
            Err(pcap::Error::NoMorePackets) => Ok(CaptureEvent::Eof),
            Err(source) => Err(CaptureError::Read {
                interface: self.interface.clone(),
                source,
            }),
        }
    }

    fn source_name(&self) -> &str {
        &self.interface
    }
}

impl Drop for LiveCapture {
    fn drop(&mut self) {
        if let Some(stat) = self.kernel_stats() {
            info!(
                interface = %self.interface,
                received = stat.received,
                dropped = stat.dropped,
                if_dropped = stat.if_dropped,
                "libpcap counters"
            );
        }
    }
}

/// Capture time from the pcap header, falling back to now.
fn header_timestamp(header: &pcap::PacketHeader) -> DateTime<Utc> {
    let secs = i64::from(header.ts.tv_sec);
    let micros = u32::try_from(header.ts.tv_usec).unwrap_or(0);
    DateTime::from_timestamp(secs, micros.saturating_mul(1_000)).unwrap_or_else(Utc::now)
}
