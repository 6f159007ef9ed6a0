//! The per-run event channel
//!
//! One ordered, append-only channel per run. If the transport stops
//! accepting data the channel marks itself closed and silently drops
//! further events rather than blocking the run or raising more errors.
//! Overall progress is monotonic: sub-scale percentages from upstream
//! phases are remapped into the channel's own bands and clamped so the
//! caller never sees progress go backwards.

use super::events::{Phase, RunEvent, SourceHealth};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Remaps an inner stage's 0–100% onto a band of the overall scale.
#[derive(Debug, Clone, Copy)]
pub struct ProgressBand {
    pub lo: u8,
    pub hi: u8,
}

impl ProgressBand {
    pub const fn new(lo: u8, hi: u8) -> Self {
        Self { lo, hi }
    }

    /// Map an inner percentage into this band.
    pub fn map(&self, inner_percent: u8) -> u8 {
        let inner = inner_percent.min(100) as u32;
        let span = (self.hi - self.lo) as u32;
        self.lo + (inner * span / 100) as u8
    }
}

/// Producer handle for one run's event stream.
#[derive(Clone)]
pub struct EventChannel {
    tx: mpsc::UnboundedSender<RunEvent>,
    closed: Arc<AtomicBool>,
    last_percent: Arc<AtomicU8>,
    started: Instant,
}

impl EventChannel {
    /// Create a channel and its consumer side.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                closed: Arc::new(AtomicBool::new(false)),
                last_percent: Arc::new(AtomicU8::new(0)),
                started: Instant::now(),
            },
            rx,
        )
    }

    /// Emit an event in order. Best-effort: once the receiver is gone the
    /// channel closes and later events are dropped without error.
    pub fn emit(&self, event: RunEvent) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        if self.tx.send(event).is_err() {
            self.closed.store(true, Ordering::Relaxed);
            tracing::debug!("event channel receiver gone; dropping further events");
        }
    }

    /// Whether the consumer has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Milliseconds since the channel (and run) started.
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Emit a status event with a monotonically clamped overall percent.
    pub fn status(
        &self,
        phase: Phase,
        message: impl Into<String>,
        percent: u8,
        sources: BTreeMap<String, SourceHealth>,
    ) {
        let clamped = self.last_percent.fetch_max(percent, Ordering::Relaxed).max(percent);
        self.emit(RunEvent::Status {
            phase,
            message: message.into(),
            percent: clamped,
            elapsed_ms: self.elapsed_ms(),
            sources,
        });
    }

    /// The highest percent reported so far.
    pub fn current_percent(&self) -> u8 {
        self.last_percent.load(Ordering::Relaxed)
    }
}

/// Emit a periodic heartbeat status so the caller can distinguish "slow but
/// alive" from "stalled". The caller aborts the handle when the phase ends.
pub fn spawn_heartbeat(
    channel: EventChannel,
    phase: Phase,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick is immediate; skip it
        loop {
            ticker.tick().await;
            if channel.is_closed() {
                break;
            }
            let percent = channel.current_percent();
            channel.status(phase, "still working", percent, BTreeMap::new());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_maps_endpoints_and_midpoint() {
        let band = ProgressBand::new(10, 80);
        assert_eq!(band.map(0), 10);
        assert_eq!(band.map(50), 45);
        assert_eq!(band.map(100), 80);
        assert_eq!(band.map(200), 80, "over-100 input is clamped");
    }

    #[tokio::test]
    async fn events_arrive_in_emission_order() {
        let (channel, mut rx) = EventChannel::new();
        channel.status(Phase::Planning, "one", 5, BTreeMap::new());
        channel.status(Phase::Gathering, "two", 20, BTreeMap::new());
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        match (first, second) {
            (
                RunEvent::Status { message: m1, .. },
                RunEvent::Status { message: m2, .. },
            ) => {
                assert_eq!(m1, "one");
                assert_eq!(m2, "two");
            }
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn percent_never_goes_backwards() {
        let (channel, mut rx) = EventChannel::new();
        channel.status(Phase::Gathering, "ahead", 60, BTreeMap::new());
        channel.status(Phase::Gathering, "late straggler", 30, BTreeMap::new());
        rx.recv().await.unwrap();
        match rx.recv().await.unwrap() {
            RunEvent::Status { percent, .. } => assert_eq!(percent, 60),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropped_receiver_closes_channel_silently() {
        let (channel, rx) = EventChannel::new();
        drop(rx);
        channel.status(Phase::Gathering, "into the void", 10, BTreeMap::new());
        assert!(channel.is_closed());
        // Emitting again is a quiet no-op
        channel.status(Phase::Gathering, "again", 11, BTreeMap::new());
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_emits_periodically() {
        let (channel, mut rx) = EventChannel::new();
        let handle = spawn_heartbeat(channel.clone(), Phase::Gathering, Duration::from_secs(5));
        tokio::task::yield_now().await; // let the heartbeat task register its timer
        tokio::time::advance(Duration::from_secs(11)).await;
        // Park so the timer driver delivers the expired heartbeat ticks
        tokio::time::sleep(Duration::from_millis(1)).await;
        let mut beats = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, RunEvent::Status { .. }) {
                beats += 1;
            }
        }
        assert!(beats >= 1, "expected at least one heartbeat");
        handle.abort();
    }
}
