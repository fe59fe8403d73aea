//! Stability tracking across ticks.
//!
//! A document is captured only after [`DetectionConfig::stability_threshold`]
//! consecutive ticks accept a rect similar to the one before it. The
//! transition itself is the pure function [`next_state`]; the
//! [`StabilityTracker`] wrapper owns the state between ticks and makes
//! `Captured` terminal until [`StabilityTracker::reset`].
//!
//! ```text
//!              miss                 similar (n + 1 < threshold)
//!            ┌──────┐               ┌──────┐
//!            v      │               v      │
//!        Searching ─┴── accept ──> Stabilizing(n) ── n + 1 >= threshold ──> Captured
//!            ^                          │
//!            └───────── miss ───────────┘
//! ```
//!
//! A miss zeroes the streak but keeps `previous_rect`, so the first
//! accept after a momentary miss is compared against the last known
//! position rather than treated as a fresh document.

use serde::{Deserialize, Serialize};

use crate::types::{DetectionConfig, Rect};

/// Streak bookkeeping carried from one tick to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StabilityState {
    /// Last accepted rect, kept across misses.
    pub previous_rect: Option<Rect>,
    /// Consecutive similar accepts, including the current one.
    pub consecutive_stable_frames: u32,
}

/// Where the tracker stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerState {
    /// No accepted rect in the current streak.
    Searching,
    /// `n >= 1` consecutive similar accepts.
    Stabilizing(u32),
    /// Stable long enough; no further transitions until reset.
    Captured,
}

impl std::fmt::Display for TrackerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Searching => write!(f, "searching"),
            Self::Stabilizing(n) => write!(f, "stabilizing ({n})"),
            Self::Captured => write!(f, "captured"),
        }
    }
}

/// Outcome of feeding one tick's candidate to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    /// The streak moved; no capture yet.
    Updated(TrackerState),
    /// The streak just reached the threshold. Emitted exactly once.
    Captured(Rect),
    /// The tracker was already captured; the candidate was discarded.
    Ignored,
}

/// Whether two rects are close enough to count as the same placement.
///
/// Both position deltas must be strictly below `position_threshold` and
/// both size deltas strictly below `size_threshold`.
#[must_use]
pub fn are_rects_similar(a: &Rect, b: &Rect, config: &DetectionConfig) -> bool {
    (a.x - b.x).abs() < config.position_threshold
        && (a.y - b.y).abs() < config.position_threshold
        && (a.width - b.width).abs() < config.size_threshold
        && (a.height - b.height).abs() < config.size_threshold
}

/// Advance the streak by one tick.
#[must_use]
pub fn next_state(
    state: StabilityState,
    candidate: Option<Rect>,
    config: &DetectionConfig,
) -> StabilityState {
    let Some(rect) = candidate else {
        return StabilityState {
            previous_rect: state.previous_rect,
            consecutive_stable_frames: 0,
        };
    };

    let consecutive_stable_frames = match state.previous_rect {
        Some(previous) if are_rects_similar(&rect, &previous, config) => {
            state.consecutive_stable_frames.saturating_add(1)
        }
        _ => 1,
    };

    StabilityState {
        previous_rect: Some(rect),
        consecutive_stable_frames,
    }
}

/// Owns [`StabilityState`] for a capture session.
#[derive(Debug, Clone)]
pub struct StabilityTracker {
    config: DetectionConfig,
    state: StabilityState,
    captured: bool,
}

impl StabilityTracker {
    /// A tracker in [`TrackerState::Searching`].
    #[must_use]
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            state: StabilityState::default(),
            captured: false,
        }
    }

    /// Feed the current tick's accepted rect, or `None` for a miss.
    pub fn update(&mut self, candidate: Option<Rect>) -> Transition {
        if self.captured {
            return Transition::Ignored;
        }

        self.state = next_state(self.state, candidate, &self.config);

        match (candidate, self.state.consecutive_stable_frames) {
            (Some(rect), n) if n >= self.config.stability_threshold => {
                self.captured = true;
                Transition::Captured(rect)
            }
            _ => Transition::Updated(self.tracker_state()),
        }
    }

    /// Current streak bookkeeping.
    #[must_use]
    pub const fn state(&self) -> StabilityState {
        self.state
    }

    /// Current state-machine position.
    #[must_use]
    pub const fn tracker_state(&self) -> TrackerState {
        if self.captured {
            TrackerState::Captured
        } else if self.state.consecutive_stable_frames == 0 {
            TrackerState::Searching
        } else {
            TrackerState::Stabilizing(self.state.consecutive_stable_frames)
        }
    }

    /// Back to `Searching` with no history, e.g. for a new session.
    pub fn reset(&mut self) {
        self.state = StabilityState::default();
        self.captured = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64) -> Rect {
        Rect::new(x, y, 230.0, 180.0)
    }

    #[test]
    fn similarity_is_strict() {
        let config = DetectionConfig::default();
        let base = rect(50.0, 40.0);
        assert!(are_rects_similar(&base, &rect(59.9, 40.0), &config));
        assert!(!are_rects_similar(&base, &rect(60.0, 40.0), &config));
        assert!(!are_rects_similar(&base, &rect(50.0, 30.0), &config));
        let taller = Rect::new(50.0, 40.0, 230.0, 200.0);
        assert!(!are_rects_similar(&base, &taller, &config));
        let slightly_taller = Rect::new(50.0, 40.0, 230.0, 199.0);
        assert!(are_rects_similar(&base, &slightly_taller, &config));
    }

    #[test]
    fn first_candidate_starts_streak_at_one() {
        let config = DetectionConfig::default();
        let next = next_state(StabilityState::default(), Some(rect(0.0, 0.0)), &config);
        assert_eq!(next.consecutive_stable_frames, 1);
        assert_eq!(next.previous_rect, Some(rect(0.0, 0.0)));
    }

    #[test]
    fn dissimilar_candidate_restarts_at_one() {
        let config = DetectionConfig::default();
        let state = StabilityState {
            previous_rect: Some(rect(0.0, 0.0)),
            consecutive_stable_frames: 3,
        };
        let next = next_state(state, Some(rect(100.0, 0.0)), &config);
        assert_eq!(next.consecutive_stable_frames, 1);
        assert_eq!(next.previous_rect, Some(rect(100.0, 0.0)));
    }

    #[test]
    fn miss_keeps_previous_rect() {
        let config = DetectionConfig::default();
        let state = StabilityState {
            previous_rect: Some(rect(5.0, 5.0)),
            consecutive_stable_frames: 4,
        };
        let next = next_state(state, None, &config);
        assert_eq!(next.consecutive_stable_frames, 0);
        assert_eq!(next.previous_rect, Some(rect(5.0, 5.0)));
    }

    #[test]
    fn streak_climbs_to_threshold_and_captures_once() {
        let config = DetectionConfig::default();
        let mut tracker = StabilityTracker::new(config.clone());
        // Each step moves just under both thresholds.
        let step_pos = config.position_threshold - 1.0;
        let step_size = config.size_threshold - 1.0;

        let mut captures = 0;
        for i in 0..5_u32 {
            let k = f64::from(i);
            let candidate = Rect::new(
                10.0 + k * step_pos,
                10.0 + k * step_pos,
                100.0 + k * step_size,
                80.0 + k * step_size,
            );
            match tracker.update(Some(candidate)) {
                Transition::Updated(state) => {
                    assert_eq!(state, TrackerState::Stabilizing(i + 1));
                }
                Transition::Captured(rect) => {
                    captures += 1;
                    assert_eq!(i, 4, "captured early");
                    assert_eq!(rect, candidate);
                }
                Transition::Ignored => unreachable!(),
            }
            assert_eq!(tracker.state().consecutive_stable_frames, i + 1);
        }
        assert_eq!(captures, 1);
        assert_eq!(tracker.tracker_state(), TrackerState::Captured);

        assert_eq!(tracker.update(Some(rect(10.0, 10.0))), Transition::Ignored);
        assert_eq!(tracker.update(None), Transition::Ignored);
    }

    #[test]
    fn miss_delays_capture_until_five_in_a_row() {
        let mut tracker = StabilityTracker::new(DetectionConfig::default());
        let same = rect(50.0, 40.0);
        let sequence = [
            Some(same),
            Some(same),
            None,
            Some(same),
            Some(same),
            Some(same),
            Some(same),
            Some(same),
        ];

        let mut captured_at = None;
        for (tick, candidate) in sequence.into_iter().enumerate() {
            if let Transition::Captured(_) = tracker.update(candidate) {
                assert!(captured_at.is_none(), "captured twice");
                captured_at = Some(tick);
            }
            if tick == 2 {
                assert_eq!(tracker.tracker_state(), TrackerState::Searching);
                assert_eq!(tracker.state().previous_rect, Some(same));
            }
        }
        assert_eq!(captured_at, Some(7));
    }

    #[test]
    fn reset_returns_to_searching() {
        let config = DetectionConfig {
            stability_threshold: 1,
            ..DetectionConfig::default()
        };
        let mut tracker = StabilityTracker::new(config);
        assert!(matches!(
            tracker.update(Some(rect(0.0, 0.0))),
            Transition::Captured(_)
        ));
        tracker.reset();
        assert_eq!(tracker.tracker_state(), TrackerState::Searching);
        assert_eq!(tracker.state(), StabilityState::default());
        assert!(matches!(
            tracker.update(Some(rect(0.0, 0.0))),
            Transition::Captured(_)
        ));
    }

    #[test]
    fn tracker_state_display() {
        assert_eq!(TrackerState::Searching.to_string(), "searching");
        assert_eq!(TrackerState::Stabilizing(3).to_string(), "stabilizing (3)");
        assert_eq!(TrackerState::Captured.to_string(), "captured");
    }
}
