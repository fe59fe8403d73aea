//! Fixed-period, single-flight tick scheduling.
//!
//! Ticks are due at `start + n * period`. The task runs on the calling
//! thread, so a tick never starts while another is running. A tick that
//! overruns its period makes the deadlines it covered overdue; those are
//! dropped rather than run back to back, and the next tick waits for the
//! first deadline still in the future.

use std::cell::Cell;
use std::time::Duration;

use tracing::{debug, warn};
use web_time::Instant;

/// Time source and sleeper for the scheduler.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;

    /// Block the caller for `duration`.
    fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Wall clock and `std::thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when told to. Sleeping advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
    slept: Cell<Duration>,
}

impl ManualClock {
    /// A clock at its origin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            slept: Cell::new(Duration::ZERO),
        }
    }

    /// Move time forward without sleeping, e.g. to simulate a slow tick.
    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    /// Time since the origin.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// Total time spent in [`Clock::sleep`].
    #[must_use]
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        self.advance(duration);
    }
}

/// What the task wants after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Schedule the next tick.
    Continue,
    /// Stop the loop now.
    Stop,
}

/// How a [`Scheduler::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleReport {
    /// Ticks the task actually ran.
    pub ticks_run: u64,
    /// Deadlines skipped because an earlier tick overran.
    pub ticks_dropped: u64,
    /// Whether the loop ended on the iteration cap instead of
    /// [`Control::Stop`].
    pub limit_reached: bool,
}

/// Runs a task once per period until it stops or the cap is hit.
#[derive(Debug, Clone)]
pub struct Scheduler<C = SystemClock> {
    period: Duration,
    max_ticks: Option<u64>,
    clock: C,
}

impl Scheduler {
    /// Nominal tick period.
    pub const DEFAULT_PERIOD: Duration = Duration::from_millis(500);
    /// Iteration cap (about 100 minutes at the default period).
    pub const DEFAULT_MAX_TICKS: u64 = 12_000;

    /// A wall-clock scheduler with the default cap.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self {
            period,
            max_ticks: Some(Self::DEFAULT_MAX_TICKS),
            clock: SystemClock,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERIOD)
    }
}

impl<C: Clock> Scheduler<C> {
    /// Same period and cap on a different clock.
    #[must_use]
    pub fn with_clock<D: Clock>(self, clock: D) -> Scheduler<D> {
        Scheduler {
            period: self.period,
            max_ticks: self.max_ticks,
            clock,
        }
    }

    /// Change the iteration cap. `None` runs until the task stops.
    #[must_use]
    pub const fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Tick period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Iteration cap.
    #[must_use]
    pub const fn max_ticks(&self) -> Option<u64> {
        self.max_ticks
    }

    /// Call `task` with the tick number (starting at 1) once per period.
    ///
    /// The first tick runs immediately.
    pub fn run<F>(&self, mut task: F) -> ScheduleReport
    where
        F: FnMut(u64) -> Control,
    {
        let start = self.clock.now();
        let mut report = ScheduleReport {
            ticks_run: 0,
            ticks_dropped: 0,
            limit_reached: false,
        };
        // Index of the deadline the next tick belongs to.
        let mut slot: u64 = 0;

        loop {
            if self.max_ticks.is_some_and(|max| report.ticks_run >= max) {
                warn!(ticks = report.ticks_run, "tick limit reached");
                report.limit_reached = true;
                return report;
            }

            report.ticks_run += 1;
            if task(report.ticks_run) == Control::Stop {
                debug!(ticks = report.ticks_run, "scheduler stopped");
                return report;
            }

            if self.period.is_zero() {
                continue;
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            let next_slot = slot + 1;
            // First deadline not yet in the past.
            let due_slot = next_slot.max(slots_until(elapsed, self.period));
            let dropped = due_slot - next_slot;
            if dropped > 0 {
                debug!(dropped, "tick overran its period, dropping overdue ticks");
                report.ticks_dropped += dropped;
            }
            slot = due_slot;

            let wait = deadline_offset(self.period, slot).saturating_sub(elapsed);
            if !wait.is_zero() {
                self.clock.sleep(wait);
            }
        }
    }
}

/// Periods needed to cover `elapsed`, rounded up.
fn slots_until(elapsed: Duration, period: Duration) -> u64 {
    let period = period.as_nanos();
    u64::try_from(elapsed.as_nanos().div_ceil(period)).unwrap_or(u64::MAX)
}

/// Offset of deadline `slot` from the start.
fn deadline_offset(period: Duration, slot: u64) -> Duration {
    let slot = u32::try_from(slot).unwrap_or(u32::MAX);
    period.saturating_mul(slot)
}
