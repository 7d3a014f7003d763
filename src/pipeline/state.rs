//! Processor state and run statistics.

use serde::Serialize;
use std::collections::HashMap;

use super::queue::QueueStats;
use crate::types::{Category, Classification, Direction};

// ============================================================================
// Processor State
// ============================================================================

/// Where the processing task is in its per-packet cycle.
///
/// Idle -> Dequeuing -> Classifying -> Encoding -> Writing -> Pacing -> Idle,
/// ending in `Stopped`. After cancellation the backlog is flushed from
/// `Draining` before stopping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum ProcessorState {
    #[default]
    Idle,
    Dequeuing,
    Classifying,
    Encoding,
    Writing,
    Pacing,
    Draining,
    Stopped(StopReason),
}

impl ProcessorState {
    pub const fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

impl std::fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Dequeuing => write!(f, "Dequeuing"),
            Self::Classifying => write!(f, "Classifying"),
            Self::Encoding => write!(f, "Encoding"),
            Self::Writing => write!(f, "Writing"),
            Self::Pacing => write!(f, "Pacing"),
            Self::Draining => write!(f, "Draining"),
            Self::Stopped(reason) => write!(f, "Stopped ({reason})"),
        }
    }
}

/// Why the processing task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// Producer gone and queue drained
    QueueClosed,
    Cancelled,
    SinkFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueClosed => write!(f, "queue closed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::SinkFailed => write!(f, "sink write failed"),
        }
    }
}

// ============================================================================
// Pipeline Statistics
// ============================================================================

/// Counters for one processor run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Packets taken off the queue and classified
    pub packets_processed: u64,
    /// Frames the sink accepted
    pub frames_written: u64,
    pub inbound: u64,
    pub outbound: u64,
    pub undetermined: u64,
    pub by_category: HashMap<Category, u64>,
    /// Packets left in the queue when the processor was cancelled
    pub abandoned: u64,
    pub queue: QueueStats,
    pub stop_reason: Option<StopReason>,
}

impl PipelineStats {
    pub fn record(&mut self, classification: &Classification) {
        self.packets_processed += 1;
        match classification.direction {
            Direction::Inbound => self.inbound += 1,
            Direction::Outbound => self.outbound += 1,
            Direction::Undetermined => self.undetermined += 1,
        }
        *self.by_category.entry(classification.category).or_insert(0) += 1;
    }

    pub fn count(&self, category: Category) -> u64 {
        self.by_category.get(&category).copied().unwrap_or(0)
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Packets processed: {}", self.packets_processed)?;
        writeln!(f, "Frames written:    {}", self.frames_written)?;
        writeln!(
            f,
            "Direction:         {} in / {} out / {} unknown",
            self.inbound, self.outbound, self.undetermined
        )?;
        for category in Category::ALL {
            let n = self.count(category);
            if n > 0 {
                writeln!(
                    f,
                    "  {:<8} {:<7} {}",
                    category.label(),
                    category.indicator_color(),
                    n
                )?;
            }
        }
        writeln!(f, "{}", self.queue)?;
        if self.abandoned > 0 {
            writeln!(f, "Abandoned in queue: {}", self.abandoned)?;
        }
        match self.stop_reason {
            Some(reason) => write!(f, "Stopped: {reason}"),
            None => write!(f, "Running"),
        }
    }
}
