//! The processing task: dequeue, classify, encode, write, pace.
//!
//! One packet at a time. Cancellation is observed while waiting on the queue
//! and while pacing; the backlog is then flushed for at most the drain
//! timeout. A sink write failure stops the loop with an error.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classifier::Classifier;
use super::encoder::{encode, PaceOutcome, Pacer};
use super::queue::QueueConsumer;
use super::sink::{FrameSink, SinkError};
use super::state::{PipelineStats, ProcessorState, StopReason};
use crate::config::defaults::{DRAIN_TIMEOUT_MS, PROGRESS_LOG_INTERVAL};
use crate::types::{Classification, Packet};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("indicator output failed: {0}")]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Capture(#[from] super::source::CaptureError),

    #[error("pipeline task panicked or was aborted: {0}")]
    TaskFailed(String),
}

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Owns everything the processing task needs.
///
/// Built with [`new()`](ProcessingLoop::new), observed through
/// [`subscribe()`](ProcessingLoop::subscribe), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop<K: FrameSink> {
    classifier: Classifier,
    sink: K,
    pacer: Pacer,
    drain_timeout: Duration,
    cancel_token: CancellationToken,
    state_tx: watch::Sender<ProcessorState>,
    stats: PipelineStats,
}

impl<K: FrameSink> ProcessingLoop<K> {
    pub fn new(
        classifier: Classifier,
        sink: K,
        pacing_interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(ProcessorState::Idle);
        Self {
            classifier,
            sink,
            pacer: Pacer::new(pacing_interval),
            drain_timeout: Duration::from_millis(DRAIN_TIMEOUT_MS),
            cancel_token,
            state_tx,
            stats: PipelineStats::default(),
        }
    }

    /// How long to keep writing queued frames after cancellation.
    #[must_use]
    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Watch the processor's state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ProcessorState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: ProcessorState) {
        self.state_tx.send_replace(state);
    }

    /// Run until the queue closes, cancellation, or a write failure.
    ///
    /// Returns final statistics on a clean stop.
    pub async fn run(
        mut self,
        mut queue: QueueConsumer<Packet>,
    ) -> Result<PipelineStats, PipelineError> {
        info!(
            sink = self.sink.sink_name(),
            pacing = ?self.pacer.interval(),
            local_addresses = self.classifier.local_addresses().len(),
            "[Processor] Task starting"
        );

        let reason = loop {
            self.set_state(ProcessorState::Dequeuing);
            let packet = tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => break StopReason::Cancelled,
                item = queue.dequeue() => match item {
                    Some(p) => p,
                    None => break StopReason::QueueClosed,
                },
            };

            if let Err(e) = self.process(&packet).await {
                self.finish(&mut queue, StopReason::SinkFailed);
                return Err(e.into());
            }

            if self.stats.packets_processed % PROGRESS_LOG_INTERVAL == 0 {
                info!(
                    "📈 Progress: {} packets | {} in / {} out | backlog {} | dropped {}",
                    self.stats.packets_processed,
                    self.stats.inbound,
                    self.stats.outbound,
                    queue.len(),
                    queue.stats().dropped
                );
            }

            self.set_state(ProcessorState::Pacing);
            if self.pacer.wait(&self.cancel_token).await == PaceOutcome::Cancelled {
                break StopReason::Cancelled;
            }
            self.set_state(ProcessorState::Idle);
        };

        if reason == StopReason::Cancelled {
            if let Err(e) = self.drain(&mut queue).await {
                self.finish(&mut queue, StopReason::SinkFailed);
                return Err(e.into());
            }
        }
        self.finish(&mut queue, reason);
        Ok(self.stats)
    }

    /// Classify, encode and write one packet.
    async fn process(&mut self, packet: &Packet) -> Result<(), SinkError> {
        self.set_state(ProcessorState::Classifying);
        let classification = self.classifier.classify(packet);
        self.stats.record(&classification);

        self.set_state(ProcessorState::Encoding);
        let frame = encode(&classification);
        log_packet(packet, &classification);

        self.set_state(ProcessorState::Writing);
        self.pacer.mark_write();
        if let Err(e) = self.sink.write_frame(&frame).await {
            error!(sink = self.sink.sink_name(), error = %e, "[Processor] Write failed");
            return Err(e);
        }
        self.stats.frames_written += 1;
        Ok(())
    }

    /// Flush the backlog after cancellation, still paced, until the queue is
    /// empty or the drain timeout runs out. Capture is stopped first so the
    /// backlog only shrinks.
    async fn drain(&mut self, queue: &mut QueueConsumer<Packet>) -> Result<(), SinkError> {
        queue.close();
        if self.drain_timeout.is_zero() || queue.is_empty() {
            return Ok(());
        }
        info!(
            backlog = queue.len(),
            timeout = ?self.drain_timeout,
            "[Processor] Draining backlog"
        );

        let deadline = Instant::now() + self.drain_timeout;
        let flushed = tokio::time::timeout_at(deadline, async {
            loop {
                self.set_state(ProcessorState::Draining);
                if let Some(ready) = self.pacer.ready_at() {
                    tokio::time::sleep_until(ready).await;
                }
                let Some(packet) = queue.dequeue().await else {
                    return Ok(());
                };
                if let Err(e) = self.process(&packet).await {
                    return Err(e);
                }
            }
        })
        .await;

        match flushed {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?self.drain_timeout, "[Processor] Drain timed out");
                Ok(())
            }
        }
    }

    /// Close the queue, count what was left behind, publish `Stopped`.
    fn finish(&mut self, queue: &mut QueueConsumer<Packet>, reason: StopReason) {
        queue.close();
        let abandoned = queue.len() as u64;
        if abandoned > 0 {
            warn!(abandoned, "[Processor] Packets left unprocessed in queue");
        }
        self.stats.abandoned = abandoned;
        self.stats.queue = queue.stats();
        self.stats.stop_reason = Some(reason);
        self.set_state(ProcessorState::Stopped(reason));
        log_final_stats(&self.stats);
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn log_packet(packet: &Packet, classification: &Classification) {
    match packet.network {
        Some(ref net) => debug!(
            category = classification.category.label(),
            color = classification.category.indicator_color(),
            direction = %classification.direction,
            src = %net.source,
            dst = %net.destination,
            len = packet.captured_len,
            captured_at = %packet.captured_at,
            "packet"
        ),
        None => debug!(
            category = classification.category.label(),
            color = classification.category.indicator_color(),
            direction = %classification.direction,
            len = packet.captured_len,
            captured_at = %packet.captured_at,
            "packet"
        ),
    }
}

fn log_final_stats(stats: &PipelineStats) {
    info!("");
    info!("{RULE}");
    info!("📊 FINAL STATISTICS");
    info!("{RULE}");
    for line in stats.to_string().lines() {
        info!("   {}", line);
    }
    info!("{RULE}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::queue::{bounded, OverflowPolicy, QueueSettings};
    use crate::types::{ether_types, LinkLayer};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

    #[async_trait]
    impl FrameSink for Recorder {
        async fn write_frame(&mut self, frame: &[u8]) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
        fn sink_name(&self) -> &str {
            "recorder"
        }
    }

    struct Failing;

    #[async_trait]
    impl FrameSink for Failing {
        async fn write_frame(&mut self, _frame: &[u8]) -> Result<(), SinkError> {
            Err(SinkError::Write {
                sink: "failing".into(),
                source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"),
            })
        }
        fn sink_name(&self) -> &str {
            "failing"
        }
    }

    fn arp() -> Packet {
        Packet::empty().with_link(LinkLayer::new(ether_types::ARP))
    }

    fn settings() -> QueueSettings {
        QueueSettings::new(10, 10, OverflowPolicy::DropNewest).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn drains_closed_queue_then_stops() {
        let (tx, rx) = bounded(settings());
        for _ in 0..3 {
            tx.enqueue(arp()).unwrap();
        }
        drop(tx);

        let sink = Recorder::default();
        let frames = Arc::clone(&sink.0);
        let lp = ProcessingLoop::new(
            Classifier::default(),
            sink,
            Duration::from_millis(150),
            CancellationToken::new(),
        );
        let state = lp.subscribe();
        let stats = lp.run(rx).await.unwrap();

        assert_eq!(stats.packets_processed, 3);
        assert_eq!(stats.frames_written, 3);
        assert_eq!(stats.stop_reason, Some(StopReason::QueueClosed));
        assert_eq!(*frames.lock().unwrap(), vec![vec![1, 6]; 3]);
        assert_eq!(*state.borrow(), ProcessorState::Stopped(StopReason::QueueClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_while_waiting_on_empty_queue() {
        let (_tx, rx) = bounded::<Packet>(settings());
        let cancel = CancellationToken::new();
        let lp = ProcessingLoop::new(
            Classifier::default(),
            Recorder::default(),
            Duration::from_millis(150),
            cancel.clone(),
        );
        let handle = tokio::spawn(lp.run(rx));
        tokio::time::sleep(Duration::from_secs(5)).await;
        cancel.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.packets_processed, 0);
        assert_eq!(stats.stop_reason, Some(StopReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_flushes_backlog_at_the_pacing_rate() {
        let (tx, rx) = bounded(settings());
        for _ in 0..4 {
            tx.enqueue(arp()).unwrap();
        }
        let cancel = CancellationToken::new();
        let lp = ProcessingLoop::new(
            Classifier::default(),
            Recorder::default(),
            Duration::from_millis(100),
            cancel.clone(),
        );
        let start = tokio::time::Instant::now();
        let handle = tokio::spawn(lp.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_written, 4);
        assert_eq!(stats.abandoned, 0);
        assert_eq!(stats.stop_reason, Some(StopReason::Cancelled));
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert_eq!(tx.enqueue(arp()), Err(crate::pipeline::queue::QueueClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_drain_timeout_abandons_backlog() {
        let (tx, rx) = bounded(settings());
        for _ in 0..4 {
            tx.enqueue(arp()).unwrap();
        }
        let cancel = CancellationToken::new();
        let lp = ProcessingLoop::new(
            Classifier::default(),
            Recorder::default(),
            Duration::from_millis(100),
            cancel.clone(),
        )
        .with_drain_timeout(Duration::ZERO);
        let handle = tokio::spawn(lp.run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_written, 1);
        assert_eq!(stats.abandoned, 3);
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_beyond_drain_timeout_is_abandoned() {
        let (tx, rx) = bounded(settings());
        for _ in 0..4 {
            tx.enqueue(arp()).unwrap();
        }
        let cancel = CancellationToken::new();
        let lp = ProcessingLoop::new(
            Classifier::default(),
            Recorder::default(),
            Duration::from_secs(60),
            cancel.clone(),
        );
        let handle = tokio::spawn(lp.run(rx));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.frames_written, 1);
        assert_eq!(stats.abandoned, 3);
        assert_eq!(stats.stop_reason, Some(StopReason::Cancelled));
        drop(tx);
    }

    #[tokio::test]
    async fn write_failure_is_fatal() {
        let (tx, rx) = bounded(settings());
        tx.enqueue(arp()).unwrap();
        tx.enqueue(arp()).unwrap();
        let lp = ProcessingLoop::new(
            Classifier::default(),
            Failing,
            Duration::from_millis(1),
            CancellationToken::new(),
        );
        let state = lp.subscribe();
        let err = lp.run(rx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Sink(_)));
        assert_eq!(*state.borrow(), ProcessorState::Stopped(StopReason::SinkFailed));
        assert_eq!(tx.enqueue(arp()), Err(crate::pipeline::queue::QueueClosed));
    }
}
