//! Two-task supervisor: capture on the blocking pool, processing on the runtime.
//!
//! Both tasks share only the ingestion queue. Either one finishing or failing
//! cancels the other; the supervisor waits for both before returning.

use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::classifier::Classifier;
use super::processing_loop::{PipelineError, ProcessingLoop};
use super::queue::{bounded, QueueSettings};
use super::sink::FrameSink;
use super::source::{run_capture, CaptureSource, CaptureStats};
use super::state::{PipelineStats, ProcessorState};
use crate::types::Packet;

// ============================================================================
// Task Names for Supervisor Logging
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskName {
    Capture,
    Processor,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capture => write!(f, "Capture"),
            Self::Processor => write!(f, "Processor"),
        }
    }
}

enum TaskOutput {
    Capture(CaptureStats),
    Processor(PipelineStats),
}

impl TaskOutput {
    const fn name(&self) -> TaskName {
        match self {
            Self::Capture(_) => TaskName::Capture,
            Self::Processor(_) => TaskName::Processor,
        }
    }
}

// ============================================================================
// Settings and Report
// ============================================================================

/// Runtime knobs for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub queue: QueueSettings,
    pub pacing_interval: Duration,
    pub drain_timeout: Duration,
}

/// What each task reported when it finished.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub capture: Option<CaptureStats>,
    pub processor: Option<PipelineStats>,
}

/// Handle to a running pipeline.
pub struct Pipeline {
    task_set: JoinSet<Result<TaskOutput, PipelineError>>,
    cancel_token: CancellationToken,
    state: tokio::sync::watch::Receiver<ProcessorState>,
}

impl Pipeline {
    /// Spawn the capture and processing tasks.
    pub fn spawn<S, K>(
        source: S,
        sink: K,
        classifier: Classifier,
        settings: PipelineSettings,
        cancel_token: CancellationToken,
    ) -> Self
    where
        S: CaptureSource,
        K: FrameSink,
    {
        let (producer, consumer) = bounded::<Packet>(settings.queue);
        let mut task_set = JoinSet::new();

        let capture_cancel = cancel_token.clone();
        task_set.spawn_blocking(move || {
            run_capture(source, producer, &capture_cancel)
                .map(TaskOutput::Capture)
                .map_err(PipelineError::from)
        });

        let processing_loop = ProcessingLoop::new(
            classifier,
            sink,
            settings.pacing_interval,
            cancel_token.clone(),
        )
        .with_drain_timeout(settings.drain_timeout);
        let state = processing_loop.subscribe();
        task_set.spawn(async move { processing_loop.run(consumer).await.map(TaskOutput::Processor) });

        Self {
            task_set,
            cancel_token,
            state,
        }
    }

    /// Observe the processor's state.
    pub fn state(&self) -> tokio::sync::watch::Receiver<ProcessorState> {
        self.state.clone()
    }

    /// Wait for both tasks, cancelling the survivor when one stops.
    ///
    /// Returns the first task error, if any, after both tasks have exited.
    pub async fn supervise(mut self) -> Result<PipelineReport, PipelineError> {
        info!("🔒 Supervisor: All tasks spawned, monitoring...");
        let mut report = PipelineReport::default();
        let mut first_error: Option<PipelineError> = None;

        while let Some(result) = self.task_set.join_next().await {
            match result {
                Ok(Ok(output)) => {
                    info!("🔒 Supervisor: Task {} completed", output.name());
                    match output {
                        TaskOutput::Capture(stats) => report.capture = Some(stats),
                        TaskOutput::Processor(stats) => {
                            report.processor = Some(stats);
                            // Nothing left to consume the queue.
                            self.cancel_token.cancel();
                        }
                    }
                }
                Ok(Err(e)) => {
                    error!("🔒 Supervisor: Task failed with error: {}", e);
                    self.cancel_token.cancel();
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    error!("🔒 Supervisor: Task panicked: {}", e);
                    self.cancel_token.cancel();
                    first_error.get_or_insert(PipelineError::TaskFailed(e.to_string()));
                }
            }
        }

        info!("🔒 Supervisor: All tasks completed");
        first_error.map_or(Ok(report), Err)
    }
}

/// Spawn a pipeline and supervise it to completion.
pub async fn run_pipeline<S, K>(
    source: S,
    sink: K,
    classifier: Classifier,
    settings: PipelineSettings,
    cancel_token: CancellationToken,
) -> Result<PipelineReport, PipelineError>
where
    S: CaptureSource,
    K: FrameSink,
{
    Pipeline::spawn(source, sink, classifier, settings, cancel_token)
        .supervise()
        .await
}
