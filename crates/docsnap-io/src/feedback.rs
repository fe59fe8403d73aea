//! Human-readable progress for whoever is holding the document.
//!
//! Purely observational: nothing in the session depends on what a
//! feedback sink does with the messages.

use docsnap_pipeline::{TickReport, TrackerState};
use tracing::{info, warn};

/// Receives status lines from a running session.
pub trait FeedbackSink {
    /// A tick completed.
    fn status(&mut self, message: &str);

    /// Something went wrong that the user should know about (a skipped
    /// tick, an unavailable camera). Defaults to [`status`](Self::status).
    fn problem(&mut self, message: &str) {
        self.status(message);
    }
}

/// The status line for one tick.
///
/// ```text
/// sharpness 213.4 | document at (50, 40) 230x180 | stabilizing (3)
/// ```
#[must_use]
pub fn describe(report: &TickReport) -> String {
    let outcome = if report.capture_triggered() {
        "captured".to_owned()
    } else {
        report.result.to_string()
    };
    match report.tracker_state {
        TrackerState::Stabilizing(_) if !report.capture_triggered() => format!(
            "sharpness {:.1} | {outcome} | {}",
            report.sharpness, report.tracker_state
        ),
        _ => format!("sharpness {:.1} | {outcome}", report.sharpness),
    }
}

/// Forwards status lines to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingFeedback;

impl FeedbackSink for TracingFeedback {
    fn status(&mut self, message: &str) {
        info!(target: "docsnap::feedback", "{message}");
    }

    fn problem(&mut self, message: &str) {
        warn!(target: "docsnap::feedback", "{message}");
    }
}

/// Keeps every message, for tests and replays.
#[derive(Debug, Clone, Default)]
pub struct CollectingFeedback {
    /// Status lines in arrival order.
    pub statuses: Vec<String>,
    /// Problem lines in arrival order.
    pub problems: Vec<String>,
}

impl FeedbackSink for CollectingFeedback {
    fn status(&mut self, message: &str) {
        self.statuses.push(message.to_owned());
    }

    fn problem(&mut self, message: &str) {
        self.problems.push(message.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use docsnap_pipeline::{CaptureTrigger, DetectionResult, Rect, RejectReason, TickDiagnostics};

    use super::*;

    fn report(result: DetectionResult, tracker_state: TrackerState) -> TickReport {
        TickReport {
            result,
            sharpness: 213.44,
            tracker_state,
            capture: None,
            diagnostics: TickDiagnostics::default(),
        }
    }

    #[test]
    fn describes_blurry_frame() {
        let line = describe(&report(
            DetectionResult::CandidateRejected(RejectReason::Blurry {
                sharpness: 80.0,
                threshold: 120.0,
            }),
            TrackerState::Searching,
        ));
        assert_eq!(
            line,
            "sharpness 213.4 | rejected: too blurry (sharpness 80.0 < 120.0)"
        );
    }

    #[test]
    fn describes_streak_progress() {
        let rect = Rect::new(50.0, 40.0, 230.0, 180.0);
        let line = describe(&report(
            DetectionResult::CandidateAccepted(rect),
            TrackerState::Stabilizing(3),
        ));
        assert_eq!(
            line,
            "sharpness 213.4 | document at (50, 40) 230x180 | stabilizing (3)"
        );
    }

    #[test]
    fn describes_capture() {
        let rect = Rect::new(50.0, 40.0, 230.0, 180.0);
        let mut captured = report(
            DetectionResult::CandidateAccepted(rect),
            TrackerState::Captured,
        );
        captured.capture = Some(CaptureTrigger {
            rect,
            native_rect: rect,
        });
        assert_eq!(describe(&captured), "sharpness 213.4 | captured");
    }

    #[test]
    fn collecting_sink_separates_problems() {
        let mut sink = CollectingFeedback::default();
        sink.status("ok");
        sink.problem("camera hiccup");
        assert_eq!(sink.statuses, ["ok"]);
        assert_eq!(sink.problems, ["camera hiccup"]);
    }
}
