//! Output sinks for encoded frames.
//!
//! [`FrameSink`] is the seam between the processing loop and the device.
//! [`SerialSink`] drives the real serial port; tests supply in-memory sinks.

use async_trait::async_trait;
use std::io::Write;
use thiserror::Error;
use tracing::info;

use crate::config::SerialConfig;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open serial device {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: serialport::Error,
    },

    #[error("write to {sink} failed: {source}")]
    Write {
        sink: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} is no longer available")]
    Gone(String),
}

/// Destination for encoded frames.
///
/// A returned error is fatal to the pipeline; implementations handle any
/// retrying they want internally.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Write every byte of `frame` and flush.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SinkError>;

    /// Human-readable name for logging (e.g. the device path).
    fn sink_name(&self) -> &str;
}

// ============================================================================
// Serial Sink
// ============================================================================

/// Frames written to a serial port.
///
/// Writes are blocking, so each one runs on the blocking pool.
pub struct SerialSink {
    device: String,
    port: Option<Box<dyn serialport::SerialPort>>,
}

impl std::fmt::Debug for SerialSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSink")
            .field("device", &self.device)
            .field("open", &self.port.is_some())
            .finish()
    }
}

impl SerialSink {
    /// Open `device` with the configured baud rate and write timeout (8N1).
    pub fn open(device: &str, config: &SerialConfig) -> Result<Self, SinkError> {
        let port = serialport::new(device, config.baud_rate)
            .timeout(config.write_timeout())
            .open()
            .map_err(|source| SinkError::Open {
                device: device.to_string(),
                source,
            })?;
        info!(device, baud = config.baud_rate, "Serial device opened");
        Ok(Self {
            device: device.to_string(),
            port: Some(port),
        })
    }
}

#[async_trait]
impl FrameSink for SerialSink {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SinkError> {
        let mut port = self
            .port
            .take()
            .ok_or_else(|| SinkError::Gone(self.device.clone()))?;
        let bytes = frame.to_vec();

        let (port, result) = tokio::task::spawn_blocking(move || {
            let result = port.write_all(&bytes).and_then(|()| port.flush());
            (port, result)
        })
        .await
        .map_err(|_| SinkError::Gone(self.device.clone()))?;

        self.port = Some(port);
        result.map_err(|source| SinkError::Write {
            sink: self.device.clone(),
            source,
        })
    }

    fn sink_name(&self) -> &str {
        &self.device
    }
}
