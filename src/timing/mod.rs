//! Scheduled events for the capture session.
//!
//! Two shapes of timing are used by the pipeline:
//! - [`Cooldown`]: a gate that opens once a period has elapsed since it was
//!   last armed (instruction debounce, quality-update throttle),
//! - [`TimerSet`]: spawned timers that post [`TimerFired`] events back to the
//!   session loop (countdown, manual-capture grace period).
//!
//! Every timer carries a generation number. Cancelling or rescheduling a
//! kind bumps its generation, so a firing that was already queued before
//! the cancel is recognised as stale and dropped.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A time gate with explicit arm and cancel.
#[derive(Debug, Clone)]
pub struct Cooldown {
    period: Duration,
    until: Option<Instant>,
}

impl Cooldown {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            until: None,
        }
    }

    /// True if the gate is open at `now`.
    pub fn is_ready(&self, now: Instant) -> bool {
        self.until.map_or(true, |until| now >= until)
    }

    /// Closes the gate for one period starting at `now`.
    pub fn arm(&mut self, now: Instant) {
        self.until = Some(now + self.period);
    }

    /// Arms and returns true if the gate was open, otherwise returns false.
    pub fn try_fire(&mut self, now: Instant) -> bool {
        if self.is_ready(now) {
            self.arm(now);
            true
        } else {
            false
        }
    }

    /// Opens the gate immediately.
    pub fn cancel(&mut self) {
        self.until = None;
    }

    pub fn is_armed(&self) -> bool {
        self.until.is_some()
    }

    /// Time left until the gate opens.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.until
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Concerns that own a spawned timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Pre-capture countdown, one firing per tick.
    Countdown,
    /// Delay before manual capture is offered.
    ManualCaptureGrace,
}

/// A timer firing delivered to the session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub generation: u64,
    /// Ticks left after this firing; zero on the final one.
    pub remaining: u32,
}

struct Scheduled {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Per-concern timer handles with cancel.
pub struct TimerSet {
    tx: mpsc::UnboundedSender<TimerFired>,
    scheduled: HashMap<TimerKind, Scheduled>,
    next_generation: u64,
}

impl TimerSet {
    /// Creates a timer set and the receiver its firings are posted to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                scheduled: HashMap::new(),
                next_generation: 1,
            },
            rx,
        )
    }

    fn spawn(&mut self, kind: TimerKind, period: Duration, ticks: u32) -> u64 {
        self.cancel(kind);
        let generation = self.next_generation;
        self.next_generation += 1;

        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            for remaining in (0..ticks).rev() {
                tokio::time::sleep(period).await;
                let fired = TimerFired {
                    kind,
                    generation,
                    remaining,
                };
                if tx.send(fired).is_err() {
                    return;
                }
            }
        });

        self.scheduled.insert(kind, Scheduled { generation, handle });
        generation
    }

    /// Fires once after `delay`. Replaces any timer of the same kind.
    pub fn schedule_once(&mut self, kind: TimerKind, delay: Duration) -> u64 {
        self.spawn(kind, delay, 1)
    }

    /// Fires `ticks` times, once per `period`. Replaces any timer of the same kind.
    pub fn schedule_ticks(&mut self, kind: TimerKind, period: Duration, ticks: u32) -> u64 {
        self.spawn(kind, period, ticks.max(1))
    }

    /// Cancels the timer of `kind`. Returns true if one was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.scheduled.remove(&kind) {
            Some(scheduled) => {
                scheduled.handle.abort();
                tracing::trace!(?kind, generation = scheduled.generation, "timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancels every pending timer.
    pub fn cancel_all(&mut self) {
        for (_, scheduled) in self.scheduled.drain() {
            scheduled.handle.abort();
        }
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.scheduled.contains_key(&kind)
    }

    /// Checks a firing against the current schedule.
    ///
    /// Returns false for stale firings. The final firing of a timer
    /// removes it from the schedule.
    pub fn accept(&mut self, fired: &TimerFired) -> bool {
        let current = match self.scheduled.get(&fired.kind) {
            Some(scheduled) => scheduled.generation == fired.generation,
            None => false,
        };
        if current && fired.remaining == 0 {
            self.scheduled.remove(&fired.kind);
        }
        current
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cooldown_gate() {
        let start = Instant::now();
        let mut cooldown = Cooldown::new(Duration::from_millis(200));

        assert!(cooldown.try_fire(start));
        assert!(!cooldown.try_fire(start + Duration::from_millis(199)));
        assert!(cooldown.try_fire(start + Duration::from_millis(200)));

        cooldown.cancel();
        assert!(cooldown.is_ready(start + Duration::from_millis(201)));
        assert!(!cooldown.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_countdown_ticks_in_order() {
        let (mut timers, mut rx) = TimerSet::new();
        let generation = timers.schedule_ticks(TimerKind::Countdown, Duration::from_secs(1), 3);

        let start = Instant::now();
        let mut seen = Vec::new();
        for _ in 0..3 {
            let fired = rx.recv().await.unwrap();
            assert_eq!(fired.generation, generation);
            assert!(timers.accept(&fired));
            seen.push(fired.remaining);
        }

        assert_eq!(seen, vec![2, 1, 0]);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert!(!timers.is_scheduled(TimerKind::Countdown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_firing() {
        let (mut timers, mut rx) = TimerSet::new();
        timers.schedule_once(TimerKind::ManualCaptureGrace, Duration::from_secs(5));
        assert!(timers.cancel(TimerKind::ManualCaptureGrace));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_firing_rejected_after_reschedule() {
        let (mut timers, mut rx) = TimerSet::new();
        timers.schedule_once(TimerKind::ManualCaptureGrace, Duration::from_millis(10));

        // Let the first timer fire into the channel, then reschedule.
        tokio::time::sleep(Duration::from_millis(20)).await;
        timers.schedule_once(TimerKind::ManualCaptureGrace, Duration::from_secs(1));

        let stale = rx.recv().await.unwrap();
        assert!(!timers.accept(&stale));

        let fresh = rx.recv().await.unwrap();
        assert!(timers.accept(&fresh));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (mut timers, mut rx) = TimerSet::new();
        timers.schedule_ticks(TimerKind::Countdown, Duration::from_secs(1), 3);
        timers.schedule_once(TimerKind::ManualCaptureGrace, Duration::from_secs(2));

        timers.cancel_all();
        assert!(!timers.is_scheduled(TimerKind::Countdown));
        assert!(!timers.is_scheduled(TimerKind::ManualCaptureGrace));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }
}
