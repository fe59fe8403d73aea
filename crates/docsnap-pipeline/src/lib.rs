//! docsnap-pipeline: document auto-capture detection (sans-IO).
//!
//! Decides, frame by frame, whether a document is framed well enough to
//! capture:
//!
//! grayscale -> sharpness gate -> blur -> edge detection -> closing ->
//! contour search -> polygon approximation -> geometric validation ->
//! stability tracking -> capture trigger.
//!
//! This crate has **no I/O dependencies**. It operates on in-memory
//! frames through the [`VisionOps`] trait and returns structured
//! reports. Cameras, files, schedulers, and encoders live in
//! `docsnap-io`.

pub mod blur;
pub mod contour;
pub mod diagnostics;
pub mod edge;
pub mod geometry;
pub mod grayscale;
pub mod pipeline;
pub mod polygon;
pub mod select;
pub mod sharpness;
pub mod simplify;
pub mod stability;
pub mod types;
pub mod vision;

pub use diagnostics::{RejectionCounts, TickDiagnostics};
pub use grayscale::decode_frame;
pub use pipeline::{CaptureTrigger, DetectionPipeline, TickReport};
pub use stability::{StabilityState, StabilityTracker, TrackerState, Transition};
pub use types::{
    Contour, DetectionConfig, DetectionResult, Dimensions, GrayImage, PipelineError, Point,
    Polygon, Rect, RejectReason, RgbaImage, Scale,
};
pub use vision::{ImageprocVision, VisionConfig, VisionOps};
