//! System-wide default constants.
//!
//! Centralises magic numbers used across the pipeline.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Capture
// ============================================================================

/// libpcap snapshot length (bytes). Large enough for any Ethernet frame.
pub const CAPTURE_SNAPLEN: i32 = 65_536;

/// libpcap read timeout (ms).
///
/// Bounds how long the capture thread can sit in a read before it notices
/// cancellation.
pub const CAPTURE_READ_TIMEOUT_MS: i32 = 250;

// ============================================================================
// Serial
// ============================================================================

/// Baud rate the indicator firmware listens at.
pub const SERIAL_BAUD_RATE: u32 = 9_600;

/// Serial write timeout (ms).
pub const SERIAL_WRITE_TIMEOUT_MS: u64 = 1_000;

/// Baud rates accepted without a validation warning.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    1_200, 2_400, 4_800, 9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600,
];

/// Bits on the wire per byte with 8N1 framing.
pub const SERIAL_BITS_PER_BYTE: u64 = 10;

// ============================================================================
// Ingestion Queue
// ============================================================================

/// Maximum packets resident in the ingestion queue.
pub const QUEUE_CAPACITY: usize = 100;

/// Occupancy at which `drop_newest` starts discarding arrivals.
pub const QUEUE_OVERFLOW_THRESHOLD: usize = 50;

/// Queues larger than this only add latency at the paced output rate.
pub const QUEUE_CAPACITY_WARN: usize = 10_000;

// ============================================================================
// Pacing
// ============================================================================

/// Minimum spacing between consecutive frames written to the device (ms).
pub const PACING_INTERVAL_MS: u64 = 150;

/// How long a cancelled run keeps writing queued frames before giving up (ms).
pub const DRAIN_TIMEOUT_MS: u64 = 1_000;

// ============================================================================
// Logging
// ============================================================================

/// Emit a progress line every N classified packets.
pub const PROGRESS_LOG_INTERVAL: u64 = 100;

/// Emit a drop summary every N dropped packets.
pub const DROP_LOG_INTERVAL: u64 = 500;

// ============================================================================
// Config Discovery
// ============================================================================

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "NETLAMP_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "netlamp.toml";
