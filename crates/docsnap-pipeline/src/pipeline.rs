//! Per-tick orchestration: sharpness gate, contour search, candidate
//! selection, stability update, capture trigger.
//!
//! ```rust
//! # use docsnap_pipeline::{DetectionConfig, DetectionPipeline, ImageprocVision, PipelineError, Scale};
//! # fn run(frames: Vec<image::RgbaImage>) -> Result<(), PipelineError> {
//! let config = DetectionConfig::default();
//! let mut pipeline = DetectionPipeline::new(ImageprocVision, config, Scale::IDENTITY)?;
//!
//! for frame in &frames {
//!     let report = pipeline.tick(frame)?;
//!     if let Some(capture) = report.capture {
//!         println!("captured at {:?}", capture.native_rect);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Resources
//!
//! Every intermediate raster (grayscale, blurred, edge map, closed edge
//! map) and the contour set is a local owned by [`DetectionPipeline::tick`]
//! or the contour search it calls. They are dropped when those scopes end,
//! on every path: blurry early return, no candidate, rejection, and
//! capture alike. The frame itself stays with the caller.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};
use web_time::Instant;

use crate::diagnostics::{StageDiagnostics, StageMetrics, TickDiagnostics};
use crate::select::{self, Selection};
use crate::sharpness;
use crate::stability::{StabilityState, StabilityTracker, TrackerState, Transition};
use crate::types::{DetectionConfig, DetectionResult, PipelineError, Rect, RejectReason, Scale};
use crate::vision::{VisionConfig, VisionOps};

/// The tracker just became stable: finalize a still.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureTrigger {
    /// Document rect in container space.
    pub rect: Rect,
    /// The same rect in native frame pixels, for drawing on the frame.
    pub native_rect: Rect,
}

/// Everything one tick produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    /// Detection outcome for this frame.
    pub result: DetectionResult,
    /// Laplacian variance of the frame.
    pub sharpness: f64,
    /// Tracker position after this tick.
    pub tracker_state: TrackerState,
    /// Present on exactly one tick per session: the one that reached
    /// the stability threshold.
    pub capture: Option<CaptureTrigger>,
    /// Stage timings and counts.
    pub diagnostics: TickDiagnostics,
}

impl TickReport {
    /// Whether this tick triggered the capture.
    #[must_use]
    pub const fn capture_triggered(&self) -> bool {
        self.capture.is_some()
    }
}

/// Drives one full detection pass per tick and owns the stability
/// tracker between ticks.
#[derive(Debug)]
pub struct DetectionPipeline<V: VisionOps> {
    vision: V,
    config: DetectionConfig,
    vision_config: VisionConfig,
    scale: Scale,
    tracker: StabilityTracker,
}

impl<V: VisionOps> DetectionPipeline<V> {
    /// Build a pipeline with default vision parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `config` fails
    /// [`DetectionConfig::validate`].
    pub fn new(vision: V, config: DetectionConfig, scale: Scale) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            vision,
            tracker: StabilityTracker::new(config.clone()),
            config,
            vision_config: VisionConfig::default(),
            scale,
        })
    }

    /// Replace the blur, edge, and approximation parameters.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if `vision_config` fails
    /// [`VisionConfig::validate`].
    pub fn with_vision_config(mut self, vision_config: VisionConfig) -> Result<Self, PipelineError> {
        vision_config.validate()?;
        self.vision_config = vision_config;
        Ok(self)
    }

    /// Acceptance thresholds.
    #[must_use]
    pub const fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Blur, edge, and approximation parameters.
    #[must_use]
    pub const fn vision_config(&self) -> &VisionConfig {
        &self.vision_config
    }

    /// Native-to-container scale fixed at construction.
    #[must_use]
    pub const fn scale(&self) -> Scale {
        self.scale
    }

    /// The vision backend.
    #[must_use]
    pub const fn vision(&self) -> &V {
        &self.vision
    }

    /// Current tracker position.
    #[must_use]
    pub const fn tracker_state(&self) -> TrackerState {
        self.tracker.tracker_state()
    }

    /// Current streak bookkeeping.
    #[must_use]
    pub const fn stability_state(&self) -> StabilityState {
        self.tracker.state()
    }

    /// Forget all stability history, e.g. to start a new capture.
    pub fn reset(&mut self) {
        debug!("stability tracker reset");
        self.tracker.reset();
    }

    /// Run one detection pass over `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyFrame`] if the frame has no pixels.
    /// The tracker is left untouched in that case.
    pub fn tick(&mut self, frame: &V::Frame) -> Result<TickReport, PipelineError> {
        let tick_start = Instant::now();

        let dimensions = self.vision.dimensions(frame);
        if dimensions.width == 0 || dimensions.height == 0 {
            return Err(PipelineError::EmptyFrame);
        }

        let mut diagnostics = TickDiagnostics {
            frame_width: dimensions.width,
            frame_height: dimensions.height,
            ..TickDiagnostics::default()
        };

        let start = Instant::now();
        let gray = self.vision.to_grayscale(frame);
        diagnostics.grayscale = Some(finish(
            start,
            StageMetrics::Grayscale {
                width: dimensions.width,
                height: dimensions.height,
            },
        ));

        let start = Instant::now();
        let sharpness = sharpness::evaluate(&self.vision, &gray);
        let threshold = self.config.min_focus_threshold;
        diagnostics.sharpness = Some(finish(
            start,
            StageMetrics::Sharpness {
                score: sharpness,
                threshold,
            },
        ));

        let result = if sharpness < threshold {
            drop(gray);
            let reason = RejectReason::Blurry {
                sharpness,
                threshold,
            };
            diagnostics.rejections.record(&reason);
            trace!(sharpness, threshold, "frame too blurry, skipping contour search");
            DetectionResult::CandidateRejected(reason)
        } else {
            let selection = self.search(&gray, &mut diagnostics);
            drop(gray);
            match selection {
                Selection {
                    best: Some(rect), ..
                } => DetectionResult::CandidateAccepted(rect),
                Selection {
                    largest_rejection: Some(reason),
                    ..
                } => DetectionResult::CandidateRejected(reason),
                Selection { .. } => DetectionResult::NoCandidate,
            }
        };

        let capture = match self.tracker.update(result.accepted()) {
            Transition::Captured(rect) => {
                let native_rect = rect.to_native(self.scale);
                info!(
                    x = rect.x,
                    y = rect.y,
                    width = rect.width,
                    height = rect.height,
                    "document stable, capture triggered"
                );
                Some(CaptureTrigger { rect, native_rect })
            }
            Transition::Updated(_) | Transition::Ignored => None,
        };

        diagnostics.total_duration = tick_start.elapsed();
        let tracker_state = self.tracker.tracker_state();
        debug!(%result, %tracker_state, summary = %diagnostics.summary(), "tick");

        Ok(TickReport {
            result,
            sharpness,
            tracker_state,
            capture,
            diagnostics,
        })
    }

    /// Blur, edges, closing, contours, selection. All rasters and the
    /// contour set are released when this returns.
    fn search(&self, gray: &V::Gray, diagnostics: &mut TickDiagnostics) -> Selection {
        let vc = &self.vision_config;

        let start = Instant::now();
        let blurred = self.vision.gaussian_blur(gray, vc.blur_sigma);
        diagnostics.blur = Some(finish(
            start,
            StageMetrics::Blur {
                sigma: vc.blur_sigma,
            },
        ));

        let start = Instant::now();
        let edges = self
            .vision
            .canny_edges(&blurred, vc.canny_low, vc.canny_high);
        drop(blurred);
        diagnostics.edge_detection = Some(finish(
            start,
            StageMetrics::EdgeDetection {
                low_threshold: vc.canny_low,
                high_threshold: vc.canny_high,
            },
        ));

        let start = Instant::now();
        let closed = self.vision.morphological_close(&edges, vc.close_radius);
        drop(edges);
        diagnostics.closing = Some(finish(
            start,
            StageMetrics::Closing {
                radius: vc.close_radius,
            },
        ));

        let start = Instant::now();
        let contours = self.vision.find_external_contours(&closed);
        drop(closed);
        diagnostics.contour_tracing = Some(finish(
            start,
            StageMetrics::ContourTracing {
                contour_count: contours.len(),
                total_point_count: contours.iter().map(crate::Contour::len).sum(),
                max_contour_points: contours.iter().map(crate::Contour::len).max().unwrap_or(0),
            },
        ));

        let start = Instant::now();
        let selection = select::select(
            &self.vision,
            &contours,
            self.scale,
            &self.config,
            vc.approx_epsilon_factor,
        );
        diagnostics.selection = Some(finish(
            start,
            StageMetrics::Selection {
                epsilon_factor: vc.approx_epsilon_factor,
                quadrilateral_count: selection.quadrilateral_count,
                accepted: selection.best.is_some(),
            },
        ));

        diagnostics.contour_count = selection.contour_count;
        diagnostics.quadrilateral_count = selection.quadrilateral_count;
        diagnostics.rejections = selection.rejections;

        trace!(
            contours = selection.contour_count,
            quads = selection.quadrilateral_count,
            "contour search done"
        );
        selection
    }
}

/// Close a stage timer.
fn finish(start: Instant, metrics: StageMetrics) -> StageDiagnostics {
    StageDiagnostics {
        duration: start.elapsed(),
        metrics,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use image::{Rgba, RgbaImage};
    use imageproc::drawing::draw_filled_rect_mut;

    use super::*;
    use crate::types::{Contour, Dimensions, Point};
    use crate::vision::{ImageprocVision, LaplacianResponse};

    // ───────────────────── scripted vision backend ─────────────────────

    /// Counts raster handles created and dropped.
    #[derive(Debug, Default)]
    struct Ledger {
        created: Cell<u32>,
        dropped: Cell<u32>,
        canny_calls: Cell<u32>,
    }

    impl Ledger {
        fn live(&self) -> u32 {
            self.created.get() - self.dropped.get()
        }
    }

    #[derive(Debug)]
    struct Handle(Rc<Ledger>);

    impl Handle {
        fn new(ledger: &Rc<Ledger>) -> Self {
            ledger.created.set(ledger.created.get() + 1);
            Self(Rc::clone(ledger))
        }
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            self.0.dropped.set(self.0.dropped.get() + 1);
        }
    }

    /// A frame that says what the pipeline should see in it.
    struct ScriptedFrame {
        width: u32,
        height: u32,
        sharpness: f64,
        contours: Vec<Contour>,
    }

    struct ScriptedRaster {
        _handle: Handle,
        sharpness: f64,
        contours: Vec<Contour>,
    }

    struct ScriptedVision {
        ledger: Rc<Ledger>,
    }

    impl ScriptedVision {
        fn raster(&self, sharpness: f64, contours: &[Contour]) -> ScriptedRaster {
            ScriptedRaster {
                _handle: Handle::new(&self.ledger),
                sharpness,
                contours: contours.to_vec(),
            }
        }
    }

    impl VisionOps for ScriptedVision {
        type Frame = ScriptedFrame;
        type Gray = ScriptedRaster;
        type Edges = ScriptedRaster;

        fn dimensions(&self, frame: &ScriptedFrame) -> Dimensions {
            Dimensions {
                width: frame.width,
                height: frame.height,
            }
        }

        fn to_grayscale(&self, frame: &ScriptedFrame) -> ScriptedRaster {
            self.raster(frame.sharpness, &frame.contours)
        }

        #[allow(clippy::cast_possible_truncation)]
        fn laplacian(&self, gray: &ScriptedRaster) -> LaplacianResponse {
            // Two values at +-r have population variance r^2.
            let r = gray.sharpness.sqrt() as f32;
            LaplacianResponse::from_raw(2, 1, vec![-r, r]).unwrap()
        }

        fn gaussian_blur(&self, gray: &ScriptedRaster, _sigma: f32) -> ScriptedRaster {
            self.raster(gray.sharpness, &gray.contours)
        }

        fn canny_edges(&self, gray: &ScriptedRaster, _low: f32, _high: f32) -> ScriptedRaster {
            self.ledger.canny_calls.set(self.ledger.canny_calls.get() + 1);
            self.raster(gray.sharpness, &gray.contours)
        }

        fn morphological_close(&self, edges: &ScriptedRaster, _radius: u8) -> ScriptedRaster {
            self.raster(edges.sharpness, &edges.contours)
        }

        fn find_external_contours(&self, edges: &ScriptedRaster) -> Vec<Contour> {
            edges.contours.clone()
        }
    }

    fn quad(x: i32, y: i32, w: i32, h: i32) -> Contour {
        Contour::new(vec![
            Point::new(x, y),
            Point::new(x + w - 1, y),
            Point::new(x + w - 1, y + h - 1),
            Point::new(x, y + h - 1),
        ])
    }

    fn scripted() -> (DetectionPipeline<ScriptedVision>, Rc<Ledger>) {
        let ledger = Rc::new(Ledger::default());
        let vision = ScriptedVision {
            ledger: Rc::clone(&ledger),
        };
        let pipeline =
            DetectionPipeline::new(vision, DetectionConfig::default(), Scale::IDENTITY).unwrap();
        (pipeline, ledger)
    }

    fn frame(sharpness: f64, contours: Vec<Contour>) -> ScriptedFrame {
        ScriptedFrame {
            width: 384,
            height: 272,
            sharpness,
            contours,
        }
    }

    // ─────────────────────────── scenarios ────────────────────────────

    #[test]
    fn undersized_document_never_captures() {
        let (mut pipeline, _ledger) = scripted();
        let frame = frame(200.0, vec![quad(50, 40, 200, 150)]);

        for _ in 0..5 {
            let report = pipeline.tick(&frame).unwrap();
            assert!((report.sharpness - 200.0).abs() < 1e-3);
            let DetectionResult::CandidateRejected(RejectReason::AreaOutOfRange { ratio }) =
                report.result
            else {
                unreachable!("expected area rejection, got {:?}", report.result);
            };
            assert!((ratio - 30_000.0 / 104_448.0).abs() < 1e-12);
            assert_eq!(report.tracker_state, TrackerState::Searching);
            assert_eq!(pipeline.stability_state().consecutive_stable_frames, 0);
            assert!(!report.capture_triggered());
        }
    }

    #[test]
    fn well_framed_document_captures_on_fifth_tick() {
        let (mut pipeline, _ledger) = scripted();
        let frame = frame(200.0, vec![quad(50, 40, 230, 180)]);
        let expected = Rect::new(50.0, 40.0, 230.0, 180.0);

        for tick in 1..=5_u32 {
            let report = pipeline.tick(&frame).unwrap();
            assert_eq!(report.result, DetectionResult::CandidateAccepted(expected));
            if tick < 5 {
                assert_eq!(report.tracker_state, TrackerState::Stabilizing(tick));
                assert!(report.capture.is_none(), "captured early on tick {tick}");
            } else {
                assert_eq!(report.tracker_state, TrackerState::Captured);
                assert_eq!(
                    report.capture,
                    Some(CaptureTrigger {
                        rect: expected,
                        native_rect: expected,
                    })
                );
            }
        }

        let after = pipeline.tick(&frame).unwrap();
        assert!(after.capture.is_none());
        assert_eq!(after.tracker_state, TrackerState::Captured);
    }

    #[test]
    fn blurry_frame_skips_contour_search() {
        let (mut pipeline, ledger) = scripted();
        let report = pipeline
            .tick(&frame(50.0, vec![quad(50, 40, 230, 180)]))
            .unwrap();

        assert!(matches!(
            report.result,
            DetectionResult::CandidateRejected(RejectReason::Blurry { .. })
        ));
        assert_eq!(ledger.canny_calls.get(), 0);
        assert!(report.diagnostics.blur.is_none());
        assert!(report.diagnostics.contour_tracing.is_none());
        assert_eq!(report.diagnostics.rejections.blurry, 1);
    }

    #[test]
    fn blurry_frame_breaks_the_streak() {
        let (mut pipeline, _ledger) = scripted();
        let sharp = frame(200.0, vec![quad(50, 40, 230, 180)]);
        let blurry = frame(10.0, vec![quad(50, 40, 230, 180)]);

        pipeline.tick(&sharp).unwrap();
        pipeline.tick(&sharp).unwrap();
        let report = pipeline.tick(&blurry).unwrap();
        assert_eq!(report.tracker_state, TrackerState::Searching);
        assert!(pipeline.stability_state().previous_rect.is_some());
    }

    #[test]
    fn no_contours_reports_no_candidate() {
        let (mut pipeline, _ledger) = scripted();
        let report = pipeline.tick(&frame(200.0, Vec::new())).unwrap();
        assert_eq!(report.result, DetectionResult::NoCandidate);
        assert_eq!(report.diagnostics.contour_count, 0);
    }

    #[test]
    fn every_intermediate_is_released_once_per_tick() {
        let (mut pipeline, ledger) = scripted();
        let frames = [
            frame(10.0, vec![quad(50, 40, 230, 180)]), // blurry
            frame(200.0, Vec::new()),                  // no contour
            frame(200.0, vec![quad(50, 40, 200, 150)]), // rejected
            frame(200.0, vec![quad(50, 40, 230, 180)]),
            frame(200.0, vec![quad(50, 40, 230, 180)]),
            frame(200.0, vec![quad(50, 40, 230, 180)]),
            frame(200.0, vec![quad(50, 40, 230, 180)]),
            frame(200.0, vec![quad(50, 40, 230, 180)]), // capture
        ];
        // grayscale only, then grayscale + blurred + edges + closed.
        let expected_per_tick = [1, 4, 4, 4, 4, 4, 4, 4];

        let mut created_before = 0;
        for (frame, expected) in frames.iter().zip(expected_per_tick) {
            let report = pipeline.tick(frame).unwrap();
            assert_eq!(ledger.live(), 0, "leaked a raster on {:?}", report.result);
            assert_eq!(ledger.created.get() - created_before, expected);
            created_before = ledger.created.get();
        }
        assert_eq!(pipeline.tracker_state(), TrackerState::Captured);
        assert_eq!(ledger.created.get(), ledger.dropped.get());
    }

    #[test]
    fn empty_frame_is_an_error_and_leaves_tracker_alone() {
        let (mut pipeline, ledger) = scripted();
        let mut empty = frame(200.0, vec![quad(50, 40, 230, 180)]);
        empty.width = 0;
        assert!(matches!(
            pipeline.tick(&empty),
            Err(PipelineError::EmptyFrame)
        ));
        assert_eq!(ledger.created.get(), 0);
        assert_eq!(pipeline.tracker_state(), TrackerState::Searching);
    }

    #[test]
    fn capture_rect_is_mapped_back_to_native_pixels() {
        let ledger = Rc::new(Ledger::default());
        let vision = ScriptedVision {
            ledger: Rc::clone(&ledger),
        };
        let config = DetectionConfig {
            stability_threshold: 1,
            ..DetectionConfig::default()
        };
        let mut pipeline = DetectionPipeline::new(vision, config, Scale { x: 2.0, y: 2.0 }).unwrap();
        let mut big = frame(200.0, vec![quad(100, 80, 460, 360)]);
        big.width = 768;
        big.height = 544;

        let capture = pipeline.tick(&big).unwrap().capture.unwrap();
        assert_eq!(capture.rect, Rect::new(50.0, 40.0, 230.0, 180.0));
        assert_eq!(capture.native_rect, Rect::new(100.0, 80.0, 460.0, 360.0));
    }

    #[test]
    fn reset_starts_over() {
        let (mut pipeline, _ledger) = scripted();
        let frame = frame(200.0, vec![quad(50, 40, 230, 180)]);
        for _ in 0..5 {
            pipeline.tick(&frame).unwrap();
        }
        assert_eq!(pipeline.tracker_state(), TrackerState::Captured);

        pipeline.reset();
        assert_eq!(pipeline.stability_state(), StabilityState::default());
        let report = pipeline.tick(&frame).unwrap();
        assert_eq!(report.tracker_state, TrackerState::Stabilizing(1));
    }

    #[test]
    fn invalid_configs_are_refused() {
        let ledger = Rc::new(Ledger::default());
        let bad = DetectionConfig {
            stability_threshold: 0,
            ..DetectionConfig::default()
        };
        assert!(
            DetectionPipeline::new(
                ScriptedVision {
                    ledger: Rc::clone(&ledger)
                },
                bad,
                Scale::IDENTITY
            )
            .is_err()
        );

        let (pipeline, _) = scripted();
        let bad_vision = VisionConfig {
            canny_low: 300.0,
            ..VisionConfig::default()
        };
        assert!(pipeline.with_vision_config(bad_vision).is_err());
    }

    // ──────────────────────── real backend ────────────────────────────

    /// Black frame with a white document at the given native rect.
    fn document_frame(x: i32, y: i32, w: u32, h: u32) -> RgbaImage {
        let mut frame = RgbaImage::from_pixel(384, 272, Rgba([0, 0, 0, 255]));
        draw_filled_rect_mut(
            &mut frame,
            imageproc::rect::Rect::at(x, y).of_size(w, h),
            Rgba([255, 255, 255, 255]),
        );
        frame
    }

    #[test]
    fn imageproc_backend_finds_and_captures_a_document() {
        let mut pipeline =
            DetectionPipeline::new(ImageprocVision, DetectionConfig::default(), Scale::IDENTITY)
                .unwrap();
        let frame = document_frame(50, 40, 230, 180);

        let mut capture = None;
        for tick in 1..=5 {
            let report = pipeline.tick(&frame).unwrap();
            let Some(rect) = report.result.accepted() else {
                unreachable!("tick {tick}: {}", report.result);
            };
            assert!((rect.x - 50.0).abs() <= 3.0, "{rect:?}");
            assert!((rect.y - 40.0).abs() <= 3.0, "{rect:?}");
            assert!((rect.width - 230.0).abs() <= 6.0, "{rect:?}");
            assert!((rect.height - 180.0).abs() <= 6.0, "{rect:?}");
            if tick < 5 {
                assert!(report.capture.is_none());
            } else {
                capture = report.capture;
            }
        }
        assert!(capture.is_some());
    }

    #[test]
    fn imageproc_backend_rejects_a_flat_frame_as_blurry() {
        let mut pipeline =
            DetectionPipeline::new(ImageprocVision, DetectionConfig::default(), Scale::IDENTITY)
                .unwrap();
        let flat = RgbaImage::from_pixel(384, 272, Rgba([128, 128, 128, 255]));
        let report = pipeline.tick(&flat).unwrap();
        assert!(report.sharpness.abs() < f64::EPSILON);
        assert!(matches!(
            report.result,
            DetectionResult::CandidateRejected(RejectReason::Blurry { .. })
        ));
    }
}
