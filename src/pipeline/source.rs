//! Capture source abstraction and the capture task body.
//!
//! libpcap reads block, so [`CaptureSource`] is a synchronous trait and
//! [`run_capture`] is meant to run on the blocking pool. It checks the
//! cancellation token before every read; the source's read timeout bounds
//! how long a cancelled capture can linger.

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::queue::{Enqueued, QueueProducer};
use crate::config::defaults::DROP_LOG_INTERVAL;
use crate::types::Packet;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("unknown capture interface '{0}' (see `netlamp devices`)")]
    UnknownInterface(String),

    #[error("failed to open capture on {interface}: {source}")]
    Open {
        interface: String,
        #[source]
        source: pcap::Error,
    },

    #[error("capture read on {interface} failed: {source}")]
    Read {
        interface: String,
        #[source]
        source: pcap::Error,
    },

    #[error("failed to enumerate capture devices: {0}")]
    Enumerate(#[source] pcap::Error),
}

/// Events produced by a capture source.
#[derive(Debug)]
pub enum CaptureEvent {
    /// A frame was captured and parsed.
    Packet(Packet),
    /// The read timeout expired with nothing captured.
    Timeout,
    /// The source has no more packets (savefile end, interface gone).
    Eof,
}

/// Where packets come from.
pub trait CaptureSource: Send + 'static {
    /// Block for at most the source's read timeout.
    fn next_packet(&mut self) -> Result<CaptureEvent, CaptureError>;

    /// Human-readable name for logging (e.g. the interface name).
    fn source_name(&self) -> &str;
}

/// Why the capture task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaptureStop {
    Cancelled,
    Eof,
    QueueClosed,
}

/// Counters for one capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub captured: u64,
    pub accepted: u64,
    pub dropped: u64,
    pub timeouts: u64,
    pub stop: CaptureStop,
}

impl std::fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Capture: {} captured, {} queued, {} dropped ({:?})",
            self.captured, self.accepted, self.dropped, self.stop
        )
    }
}

/// Read packets from `source` into the queue until cancelled, exhausted, or
/// the consumer goes away.
///
/// The producer is consumed; dropping it on return closes the queue so the
/// processor drains what is left and stops.
pub fn run_capture<S: CaptureSource>(
    mut source: S,
    producer: QueueProducer<Packet>,
    cancel: &CancellationToken,
) -> Result<CaptureStats, CaptureError> {
    let mut captured = 0u64;
    let mut accepted = 0u64;
    let mut dropped = 0u64;
    let mut timeouts = 0u64;

    info!(
        source = source.source_name(),
        policy = %producer.settings().policy(),
        "[Capture] Task starting"
    );

    let stop = loop {
        if cancel.is_cancelled() {
            break CaptureStop::Cancelled;
        }

        let packet = match source.next_packet()? {
            CaptureEvent::Packet(p) => p,
            CaptureEvent::Timeout => {
                timeouts += 1;
                continue;
            }
            CaptureEvent::Eof => break CaptureStop::Eof,
        };
        captured += 1;

        match producer.enqueue(packet) {
            Ok(Enqueued::Accepted) => accepted += 1,
            Ok(Enqueued::Dropped) => {
                dropped += 1;
                debug!(resident = producer.len(), "[Capture] Queue busy, packet dropped");
                if dropped % DROP_LOG_INTERVAL == 0 {
                    warn!(
                        dropped,
                        captured,
                        "[Capture] Output cannot keep up, dropping packets"
                    );
                }
            }
            Err(_) => break CaptureStop::QueueClosed,
        }
    };

    let stats = CaptureStats {
        captured,
        accepted,
        dropped,
        timeouts,
        stop,
    };
    info!("[Capture] Stopped: {}", stats);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::{bounded, OverflowPolicy, QueueSettings};
    use std::collections::VecDeque;

    struct Scripted(VecDeque<CaptureEvent>);

    impl CaptureSource for Scripted {
        fn next_packet(&mut self) -> Result<CaptureEvent, CaptureError> {
            Ok(self.0.pop_front().unwrap_or(CaptureEvent::Eof))
        }

        fn source_name(&self) -> &str {
            "scripted"
        }
    }

    fn packets(n: usize) -> Scripted {
        Scripted((0..n).map(|_| CaptureEvent::Packet(Packet::empty())).collect())
    }

    #[test]
    fn counts_accepted_and_dropped_until_eof() {
        let settings = QueueSettings::new(10, 5, OverflowPolicy::DropNewest).unwrap();
        let (tx, rx) = bounded(settings);
        let stats = run_capture(packets(8), tx, &CancellationToken::new()).unwrap();
        assert_eq!(stats.captured, 8);
        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.stop, CaptureStop::Eof);
        assert_eq!(rx.len(), 5);
    }

    #[test]
    fn timeouts_are_counted_not_queued() {
        let settings = QueueSettings::new(10, 10, OverflowPolicy::DropNewest).unwrap();
        let (tx, rx) = bounded(settings);
        let script = Scripted(VecDeque::from([
            CaptureEvent::Timeout,
            CaptureEvent::Packet(Packet::empty()),
            CaptureEvent::Timeout,
        ]));
        let stats = run_capture(script, tx, &CancellationToken::new()).unwrap();
        assert_eq!(stats.timeouts, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn cancelled_before_first_read() {
        let settings = QueueSettings::new(10, 10, OverflowPolicy::DropNewest).unwrap();
        let (tx, _rx) = bounded(settings);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stats = run_capture(packets(3), tx, &cancel).unwrap();
        assert_eq!(stats.captured, 0);
        assert_eq!(stats.stop, CaptureStop::Cancelled);
    }

    #[test]
    fn stops_when_consumer_is_gone() {
        let settings = QueueSettings::new(10, 10, OverflowPolicy::DropNewest).unwrap();
        let (tx, rx) = bounded(settings);
        drop(rx);
        let stats = run_capture(packets(3), tx, &CancellationToken::new()).unwrap();
        assert_eq!(stats.stop, CaptureStop::QueueClosed);
        assert_eq!(stats.captured, 1);
    }

    #[test]
    fn read_errors_are_fatal() {
        struct Broken;
        impl CaptureSource for Broken {
            fn next_packet(&mut self) -> Result<CaptureEvent, CaptureError> {
                Err(CaptureError::Read {
                    interface: "eth9".into(),
                    source: pcap::Error::PcapError("device went away".into()),
                })
            }
            fn source_name(&self) -> &str {
                "broken"
            }
        }
        let settings = QueueSettings::new(10, 10, OverflowPolicy::DropNewest).unwrap();
        let (tx, _rx) = bounded(settings);
        let err = run_capture(Broken, tx, &CancellationToken::new()).unwrap_err();
        assert!(err.to_string().contains("eth9"));
    }
}
