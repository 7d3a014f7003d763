//! netlamp: live traffic classification for a serial signal lamp
//!
//! Captures packets on one interface, classifies each into a protocol
//! category and a direction, and writes a two-byte frame per packet to an
//! indicator device over a serial link.
//!
//! ## Architecture
//!
//! - **Acquisition**: libpcap capture and frame decoding
//! - **Pipeline**: bounded ingestion queue, classifier, encoder/pacer, sink
//! - **Config**: TOML settings with validation and CLI overrides

pub mod acquisition;
pub mod config;
pub mod pipeline;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, LampConfig};

// Re-export commonly used types
pub use types::{Category, Classification, Direction, LocalAddressSet, Packet};

// Re-export pipeline components
pub use pipeline::{
    encode, run_pipeline, CaptureSource, Classifier, FrameSink, OverflowPolicy, Pipeline,
    PipelineError, PipelineSettings, PipelineStats, SerialSink,
};

// Re-export acquisition
pub use acquisition::LiveCapture;
