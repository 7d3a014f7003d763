//! Frame encoding and output pacing.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::types::Classification;

/// Bytes per frame on the serial link.
pub const FRAME_LEN: usize = 2;

/// One frame: `[direction, category]`.
pub type Frame = [u8; FRAME_LEN];

/// Encode a classification for the indicator device.
pub const fn encode(classification: &Classification) -> Frame {
    [
        classification.direction.wire_code(),
        classification.category.wire_code(),
    ]
}

/// Outcome of a pacing wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    Elapsed,
    Cancelled,
}

/// Enforces a minimum gap between consecutive device writes.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    last_write: Option<Instant>,
}

impl Pacer {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_write: None,
        }
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Record that a write just started.
    pub fn mark_write(&mut self) {
        self.last_write = Some(Instant::now());
    }

    /// Earliest instant the next write may start, `None` before the first.
    pub fn ready_at(&self) -> Option<Instant> {
        self.last_write.map(|last| last + self.interval)
    }

    /// Sleep until `interval` has passed since the last write started.
    ///
    /// Returns immediately with `Elapsed` before the first write.
    pub async fn wait(&self, cancel: &CancellationToken) -> PaceOutcome {
        let Some(ready) = self.ready_at() else {
            return PaceOutcome::Elapsed;
        };
        tokio::select! {
            () = cancel.cancelled() => PaceOutcome::Cancelled,
            () = tokio::time::sleep_until(ready) => PaceOutcome::Elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Direction};

    #[test]
    fn encodes_direction_then_category() {
        let c = Classification::new(Direction::Inbound, Category::Udp);
        assert_eq!(encode(&c), [0x00, 0x08]);
        let c = Classification::new(Direction::Outbound, Category::Anomaly);
        assert_eq!(encode(&c), [0x01, 0x01]);
        let c = Classification::new(Direction::Undetermined, Category::Arp);
        assert_eq!(encode(&c), [0x01, 0x06]);
        let c = Classification::new(Direction::Outbound, Category::Icmpv6);
        assert_eq!(encode(&c), [0x01, 0x04]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_wait_does_not_sleep() {
        let pacer = Pacer::new(Duration::from_millis(150));
        let start = Instant::now();
        assert_eq!(pacer.wait(&CancellationToken::new()).await, PaceOutcome::Elapsed);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_out_the_interval_after_a_write() {
        let mut pacer = Pacer::new(Duration::from_millis(150));
        pacer.mark_write();
        let start = Instant::now();
        assert_eq!(pacer.wait(&CancellationToken::new()).await, PaceOutcome::Elapsed);
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn time_already_spent_counts_toward_the_interval() {
        let mut pacer = Pacer::new(Duration::from_millis(150));
        pacer.mark_write();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let start = Instant::now();
        pacer.wait(&CancellationToken::new()).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(50) && waited < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_at_follows_the_last_write() {
        let mut pacer = Pacer::new(Duration::from_millis(150));
        assert!(pacer.ready_at().is_none());
        pacer.mark_write();
        assert_eq!(pacer.ready_at(), Some(Instant::now() + Duration::from_millis(150)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let mut pacer = Pacer::new(Duration::from_secs(3600));
        pacer.mark_write();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let start = Instant::now();
        assert_eq!(pacer.wait(&cancel).await, PaceOutcome::Cancelled);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
