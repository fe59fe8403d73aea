//! A capture session: one frame source, one pipeline, run on a schedule
//! until a document is captured.
//!
//! Startup (opening the source, deriving the scale) either succeeds or
//! leaves nothing running. Once running, every per-tick problem (a frame
//! that could not be grabbed, an empty frame) skips that tick only; the
//! next tick is the retry. The loop ends on capture, on end of stream,
//! or on the scheduler's iteration cap.

use docsnap_pipeline::{
    DetectionConfig, DetectionPipeline, Dimensions, ImageprocVision, PipelineError, Rect, Scale,
    TickReport, VisionConfig,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::capture::{CaptureError, CaptureSink, Still};
use crate::feedback::{self, FeedbackSink};
use crate::scheduler::{Clock, Control, Scheduler};
use crate::source::{FrameSource, SourceError};

/// Detection thresholds and vision parameters, as loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Acceptance and stability thresholds.
    pub detection: DetectionConfig,
    /// Blur, edge, and approximation parameters.
    pub vision: VisionConfig,
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The frame source could not be opened.
    #[error("camera unavailable: {0}")]
    Source(#[from] SourceError),

    /// The configuration was rejected or the source reported no pixels.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The document was stable but the still could not be produced.
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
}

/// How [`Session::run`] ended.
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// A document was captured.
    Captured {
        /// Tick number that triggered the capture.
        tick: u64,
        /// Document rect in container space.
        rect: Rect,
        /// The encoded still.
        still: Still,
    },
    /// The scheduler's iteration cap was hit first.
    TickLimitReached {
        /// Ticks run.
        ticks: u64,
    },
    /// The source ran out of frames first.
    SourceExhausted {
        /// Ticks run, including the one that found the stream empty.
        ticks: u64,
    },
}

/// A started capture session.
#[derive(Debug)]
pub struct Session<S> {
    source: S,
    pipeline: DetectionPipeline<ImageprocVision>,
    dimensions: Dimensions,
}

impl<S: FrameSource> Session<S> {
    /// Open `source` and prepare the pipeline.
    ///
    /// A startup failure is also reported to `feedback` as a problem,
    /// since no tick will ever run to report anything else.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Source`] if the source cannot be opened,
    /// or [`SessionError::Pipeline`] if either configuration is invalid
    /// or the source reports an empty frame size.
    pub fn start(
        source: S,
        config: SessionConfig,
        feedback: &mut dyn FeedbackSink,
    ) -> Result<Self, SessionError> {
        Self::open(source, config).inspect_err(|e| {
            warn!(error = %e, "session failed to start");
            feedback.problem(&e.to_string());
        })
    }

    fn open(mut source: S, config: SessionConfig) -> Result<Self, SessionError> {
        config.detection.validate()?;
        config.vision.validate()?;

        let dimensions = source.open()?;
        let scale = Scale::between(dimensions, &config.detection)?;
        info!(
            width = dimensions.width,
            height = dimensions.height,
            scale_x = scale.x,
            scale_y = scale.y,
            "session started"
        );

        let pipeline = DetectionPipeline::new(ImageprocVision, config.detection, scale)?
            .with_vision_config(config.vision)?;

        Ok(Self {
            source,
            pipeline,
            dimensions,
        })
    }

    /// Native frame size reported by the source.
    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    /// The pipeline driving this session.
    #[must_use]
    pub const fn pipeline(&self) -> &DetectionPipeline<ImageprocVision> {
        &self.pipeline
    }

    /// The frame source.
    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Reset stability tracking so the next run captures a new document.
    pub fn restart(&mut self) {
        info!("session restarted");
        self.pipeline.reset();
    }

    /// Tick on `scheduler` until capture, end of stream, or the cap.
    ///
    /// `on_tick` sees every completed tick report, e.g. for JSON output.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Capture`] if the capture sink fails. No
    /// per-tick problem is an error.
    pub fn run<C: Clock>(
        &mut self,
        scheduler: &Scheduler<C>,
        capture: &mut dyn CaptureSink,
        feedback: &mut dyn FeedbackSink,
        mut on_tick: impl FnMut(u64, &TickReport),
    ) -> Result<SessionOutcome, SessionError> {
        let mut ended: Option<Result<SessionOutcome, SessionError>> = None;

        let report = scheduler.run(|tick| {
            match self.step(tick, &mut *capture, &mut *feedback, &mut on_tick) {
                Step::Continue => Control::Continue,
                Step::Exhausted => {
                    ended = Some(Ok(SessionOutcome::SourceExhausted { ticks: tick }));
                    Control::Stop
                }
                Step::Done(result) => {
                    ended = Some(result);
                    Control::Stop
                }
            }
        });

        if report.ticks_dropped > 0 {
            debug!(dropped = report.ticks_dropped, "overdue ticks were dropped");
        }

        ended.unwrap_or(Ok(SessionOutcome::TickLimitReached {
            ticks: report.ticks_run,
        }))
    }

    /// One tick. The frame lives only inside this call.
    fn step(
        &mut self,
        tick: u64,
        capture: &mut dyn CaptureSink,
        feedback: &mut dyn FeedbackSink,
        on_tick: &mut impl FnMut(u64, &TickReport),
    ) -> Step {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!(tick, "frame source exhausted");
                return Step::Exhausted;
            }
            Err(e) => {
                warn!(tick, error = %e, "frame unavailable, skipping tick");
                feedback.problem(&format!("frame skipped: {e}"));
                return Step::Continue;
            }
        };

        let found = Dimensions {
            width: frame.width(),
            height: frame.height(),
        };
        if found != self.dimensions {
            let e = SourceError::DimensionMismatch {
                expected: self.dimensions,
                found,
            };
            warn!(tick, error = %e, "frame size changed, skipping tick");
            feedback.problem(&format!("frame skipped: {e}"));
            return Step::Continue;
        }

        let report = match self.pipeline.tick(&frame) {
            Ok(report) => report,
            Err(e) => {
                warn!(tick, error = %e, "tick failed, skipping");
                feedback.problem(&format!("frame skipped: {e}"));
                return Step::Continue;
            }
        };

        feedback.status(&feedback::describe(&report));
        on_tick(tick, &report);

        let Some(trigger) = report.capture else {
            return Step::Continue;
        };

        let result = capture
            .capture(&frame, &trigger)
            .map(|still| {
                info!(tick, bytes = still.bytes.len(), "document captured");
                SessionOutcome::Captured {
                    tick,
                    rect: trigger.rect,
                    still,
                }
            })
            .map_err(SessionError::from);
        Step::Done(result)
    }
}

/// What the scheduler should do after a tick.
enum Step {
    Continue,
    Exhausted,
    Done(Result<SessionOutcome, SessionError>),
}
