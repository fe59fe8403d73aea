//! Frame sources.
//!
//! A source is opened once at session start; failing to open is fatal
//! for the session. After that, each tick asks for one frame. A frame
//! that cannot be produced is a per-tick failure and the session simply
//! skips that tick.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use docsnap_pipeline::{Dimensions, PipelineError, RgbaImage};
use tracing::debug;

/// File extensions [`ImageSequenceSource`] picks up.
const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Errors from opening a source or grabbing a frame.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reading a file or directory failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// What was being read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A frame file could not be decoded.
    #[error("failed to decode {path}: {source}")]
    Decode {
        /// The offending file.
        path: PathBuf,
        /// Underlying error.
        source: PipelineError,
    },

    /// The source has no frames at all.
    #[error("no frames found in {0}")]
    Empty(PathBuf),

    /// The device or stream is not available.
    #[error("frame source unavailable: {0}")]
    Unavailable(String),

    /// A frame arrived with a different size than the source reported.
    #[error(
        "frame is {}x{}, expected {}x{}",
        .found.width, .found.height, .expected.width, .expected.height
    )]
    DimensionMismatch {
        /// Size reported when the source was opened.
        expected: Dimensions,
        /// Size of the frame just grabbed.
        found: Dimensions,
    },
}

/// Something that hands out camera frames.
pub trait FrameSource {
    /// Prepare the source and report the native frame size.
    ///
    /// # Errors
    ///
    /// Any error here means no detection loop can start.
    fn open(&mut self) -> Result<Dimensions, SourceError>;

    /// Grab the next frame, or `Ok(None)` at end of stream.
    ///
    /// # Errors
    ///
    /// A failed grab affects this tick only.
    fn next_frame(&mut self) -> Result<Option<RgbaImage>, SourceError>;
}

fn dimensions_of(frame: &RgbaImage) -> Dimensions {
    Dimensions {
        width: frame.width(),
        height: frame.height(),
    }
}

fn read_frame(path: &Path) -> Result<RgbaImage, SourceError> {
    let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    docsnap_pipeline::decode_frame(&bytes).map_err(|source| SourceError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            FRAME_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Image files in a directory, played back in file-name order.
///
/// Stands in for a camera when tuning thresholds against recorded
/// frames.
#[derive(Debug)]
pub struct ImageSequenceSource {
    directory: PathBuf,
    looped: bool,
    paths: Vec<PathBuf>,
    next: usize,
    dimensions: Option<Dimensions>,
}

impl ImageSequenceSource {
    /// A source over `directory`. Nothing is read until [`FrameSource::open`].
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            looped: false,
            paths: Vec::new(),
            next: 0,
            dimensions: None,
        }
    }

    /// Start over from the first file after the last one instead of
    /// ending the stream.
    #[must_use]
    pub const fn looped(mut self, looped: bool) -> Self {
        self.looped = looped;
        self
    }

    /// Frame files found by [`FrameSource::open`], in playback order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequenceSource {
    fn open(&mut self) -> Result<Dimensions, SourceError> {
        let io_error = |source| SourceError::Io {
            path: self.directory.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.directory).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if path.is_file() && is_frame_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let Some(first) = paths.first() else {
            return Err(SourceError::Empty(self.directory.clone()));
        };
        let dimensions = dimensions_of(&read_frame(first)?);
        debug!(
            directory = %self.directory.display(),
            frames = paths.len(),
            width = dimensions.width,
            height = dimensions.height,
            "image sequence opened"
        );

        self.paths = paths;
        self.next = 0;
        self.dimensions = Some(dimensions);
        Ok(dimensions)
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>, SourceError> {
        if self.next >= self.paths.len() {
            if !self.looped || self.paths.is_empty() {
                return Ok(None);
            }
            self.next = 0;
        }

        let path = &self.paths[self.next];
        self.next += 1;

        let frame = read_frame(path)?;
        if let Some(expected) = self.dimensions {
            let found = dimensions_of(&frame);
            if found != expected {
                return Err(SourceError::DimensionMismatch { expected, found });
            }
        }
        Ok(Some(frame))
    }
}

/// One image, handed out on every tick.
#[derive(Debug)]
pub struct StillImageSource {
    path: Option<PathBuf>,
    frame: Option<RgbaImage>,
}

impl StillImageSource {
    /// Read and decode `path` when opened.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            frame: None,
        }
    }

    /// Serve an already-decoded frame.
    #[must_use]
    pub const fn from_frame(frame: RgbaImage) -> Self {
        Self {
            path: None,
            frame: Some(frame),
        }
    }
}

impl FrameSource for StillImageSource {
    fn open(&mut self) -> Result<Dimensions, SourceError> {
        if let Some(path) = &self.path {
            self.frame = Some(read_frame(path)?);
        }
        self.frame
            .as_ref()
            .map(dimensions_of)
            .ok_or_else(|| SourceError::Unavailable("no image to serve".to_owned()))
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>, SourceError> {
        self.frame
            .clone()
            .map(Some)
            .ok_or_else(|| SourceError::Unavailable("source was not opened".to_owned()))
    }
}

/// Frames scripted in memory, including failures.
///
/// Ends the stream once every entry has been handed out.
#[derive(Debug)]
pub struct VecSource {
    dimensions: Dimensions,
    frames: VecDeque<Result<RgbaImage, SourceError>>,
    open_error: Option<SourceError>,
}

impl VecSource {
    /// Serve `frames` in order. The first frame decides the reported size.
    #[must_use]
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        let dimensions = frames.first().map_or(
            Dimensions {
                width: 0,
                height: 0,
            },
            dimensions_of,
        );
        Self {
            dimensions,
            frames: frames.into_iter().map(Ok).collect(),
            open_error: None,
        }
    }

    /// Serve a mix of frames and per-tick failures at a fixed size.
    #[must_use]
    pub fn from_results(
        dimensions: Dimensions,
        frames: Vec<Result<RgbaImage, SourceError>>,
    ) -> Self {
        Self {
            dimensions,
            frames: frames.into(),
            open_error: None,
        }
    }

    /// Make [`FrameSource::open`] fail, like a camera whose permission
    /// was denied.
    #[must_use]
    pub fn failing_to_open(error: SourceError) -> Self {
        Self {
            dimensions: Dimensions {
                width: 0,
                height: 0,
            },
            frames: VecDeque::new(),
            open_error: Some(error),
        }
    }

    /// Entries not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for VecSource {
    fn open(&mut self) -> Result<Dimensions, SourceError> {
        if let Some(error) = self.open_error.take() {
            return Err(error);
        }
        if self.dimensions.width == 0 || self.dimensions.height == 0 {
            return Err(SourceError::Unavailable("no frames scripted".to_owned()));
        }
        Ok(self.dimensions)
    }

    fn next_frame(&mut self) -> Result<Option<RgbaImage>, SourceError> {
        self.frames.pop_front().transpose()
    }
}
