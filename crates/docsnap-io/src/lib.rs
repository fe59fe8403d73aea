//! docsnap-io: everything around the detection pipeline that touches the
//! outside world.
//!
//! Supplies frames ([`FrameSource`]), turns a capture trigger into an
//! encoded still ([`CaptureSink`]), reports progress ([`FeedbackSink`]),
//! and drives the pipeline at a fixed period ([`Scheduler`], [`Session`]).

pub mod capture;
pub mod feedback;
pub mod scheduler;
pub mod session;
pub mod source;

pub use capture::{CaptureError, CaptureSink, DirectoryCapture, Still, StillCapture, StillFormat};
pub use feedback::{CollectingFeedback, FeedbackSink, TracingFeedback, describe};
pub use scheduler::{Clock, Control, ManualClock, ScheduleReport, Scheduler, SystemClock};
pub use session::{Session, SessionConfig, SessionError, SessionOutcome};
pub use source::{FrameSource, ImageSequenceSource, SourceError, StillImageSource, VecSource};
