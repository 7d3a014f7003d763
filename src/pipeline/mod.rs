//! Packet Processing Pipeline
//!
//! ```text
//! Capture Source ──▶ Ingestion Queue ──▶ Classifier ──▶ Encoder/Pacer ──▶ Frame Sink
//!  (blocking pool)     (bounded FIFO)     (pure)         ([dir, cat])      (serial port)
//! ```
//!
//! Two tasks share only the queue: [`source::run_capture`] fills it and
//! [`processing_loop::ProcessingLoop`] drains it, one paced frame per packet.
//! [`supervisor::Pipeline`] owns both.

mod state;
pub mod classifier;
pub mod encoder;
pub mod processing_loop;
pub mod queue;
pub mod sink;
pub mod source;
pub mod supervisor;

pub use classifier::Classifier;
pub use encoder::{encode, Frame, Pacer, FRAME_LEN};
pub use processing_loop::{PipelineError, ProcessingLoop};
pub use queue::{OverflowPolicy, QueueSettings};
pub use sink::{FrameSink, SerialSink, SinkError};
pub use source::{CaptureError, CaptureEvent, CaptureSource, CaptureStats};
pub use state::*;
pub use supervisor::{run_pipeline, Pipeline, PipelineReport, PipelineSettings, TaskName};
