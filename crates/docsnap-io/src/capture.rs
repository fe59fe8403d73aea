//! Turning a capture trigger into a still image.
//!
//! The sink gets the frame that triggered the capture and the document
//! rect in native pixels. It draws the rect as an outline on a copy of
//! the frame and encodes the result.

use std::path::{Path, PathBuf};

use docsnap_pipeline::{CaptureTrigger, Rect, RgbaImage};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, Rgba};
use imageproc::drawing::draw_hollow_rect_mut;
use serde::{Deserialize, Serialize};
use tracing::info;
use web_time::{SystemTime, UNIX_EPOCH};

/// Errors from rendering, encoding, or storing a still.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Image encoding failed.
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// Writing the still failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Encoding for captured stills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StillFormat {
    /// Lossless PNG (keeps alpha).
    #[default]
    Png,
    /// JPEG at the given quality (1-100).
    Jpeg {
        /// Encoder quality.
        quality: u8,
    },
}

impl StillFormat {
    /// JPEG quality used when none is given.
    pub const DEFAULT_JPEG_QUALITY: u8 = 90;

    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg { .. } => "jpg",
        }
    }

    /// MIME type of the encoded bytes.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// An encoded capture.
#[derive(Debug, Clone)]
pub struct Still {
    /// Encoded image bytes.
    pub bytes: Vec<u8>,
    /// How `bytes` are encoded.
    pub format: StillFormat,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Where the still was written, if it was.
    pub path: Option<PathBuf>,
}

/// Receives the frame and rect of a stable detection.
pub trait CaptureSink {
    /// Produce the final still for `trigger` from `frame`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError`] if rendering, encoding, or storage fails.
    fn capture(&mut self, frame: &RgbaImage, trigger: &CaptureTrigger)
    -> Result<Still, CaptureError>;
}

/// Draws the overlay and encodes in memory.
#[derive(Debug, Clone)]
pub struct StillCapture {
    format: StillFormat,
    overlay_color: Rgba<u8>,
    overlay_thickness: u32,
}

impl StillCapture {
    /// Default outline colour (green).
    pub const DEFAULT_OVERLAY_COLOR: Rgba<u8> = Rgba([0, 200, 80, 255]);
    /// Default outline thickness in pixels.
    pub const DEFAULT_OVERLAY_THICKNESS: u32 = 3;

    /// A capture sink producing `format` stills.
    #[must_use]
    pub const fn new(format: StillFormat) -> Self {
        Self {
            format,
            overlay_color: Self::DEFAULT_OVERLAY_COLOR,
            overlay_thickness: Self::DEFAULT_OVERLAY_THICKNESS,
        }
    }

    /// Change the outline colour.
    #[must_use]
    pub const fn with_overlay_color(mut self, color: Rgba<u8>) -> Self {
        self.overlay_color = color;
        self
    }

    /// Change the outline thickness. Zero disables the overlay.
    #[must_use]
    pub const fn with_overlay_thickness(mut self, thickness: u32) -> Self {
        self.overlay_thickness = thickness;
        self
    }

    /// Output encoding.
    #[must_use]
    pub const fn format(&self) -> StillFormat {
        self.format
    }

    /// A copy of `frame` with `native_rect` outlined, clipped to the frame.
    #[must_use]
    pub fn render(&self, frame: &RgbaImage, native_rect: &Rect) -> RgbaImage {
        let mut image = frame.clone();

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (x, y, width, height) = (
            native_rect.x.round().max(0.0) as i32,
            native_rect.y.round().max(0.0) as i32,
            native_rect.width.round().max(0.0) as u32,
            native_rect.height.round().max(0.0) as u32,
        );

        for inset in 0..self.overlay_thickness {
            let Some(w) = width.checked_sub(2 * inset).filter(|&w| w > 0) else {
                break;
            };
            let Some(h) = height.checked_sub(2 * inset).filter(|&h| h > 0) else {
                break;
            };
            #[allow(clippy::cast_possible_wrap)]
            let offset = inset as i32;
            let rect = imageproc::rect::Rect::at(x + offset, y + offset).of_size(w, h);
            draw_hollow_rect_mut(&mut image, rect, self.overlay_color);
        }

        image
    }

    /// Encode `image` in the configured format.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Encode`] if the encoder fails.
    pub fn encode(&self, image: &RgbaImage) -> Result<Vec<u8>, CaptureError> {
        let mut bytes = Vec::new();
        match self.format {
            StillFormat::Png => {
                let encoder = image::codecs::png::PngEncoder::new(&mut bytes);
                encoder.write_image(
                    image.as_raw(),
                    image.width(),
                    image.height(),
                    ExtendedColorType::Rgba8,
                )?;
            }
            StillFormat::Jpeg { quality } => {
                // JPEG has no alpha channel.
                let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
                let encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
                encoder.write_image(
                    rgb.as_raw(),
                    rgb.width(),
                    rgb.height(),
                    ExtendedColorType::Rgb8,
                )?;
            }
        }
        Ok(bytes)
    }
}

impl Default for StillCapture {
    fn default() -> Self {
        Self::new(StillFormat::default())
    }
}

impl CaptureSink for StillCapture {
    fn capture(
        &mut self,
        frame: &RgbaImage,
        trigger: &CaptureTrigger,
    ) -> Result<Still, CaptureError> {
        let rendered = self.render(frame, &trigger.native_rect);
        let bytes = self.encode(&rendered)?;
        Ok(Still {
            bytes,
            format: self.format,
            width: rendered.width(),
            height: rendered.height(),
            path: None,
        })
    }
}

/// [`StillCapture`] that also writes each still into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryCapture {
    still: StillCapture,
    directory: PathBuf,
    prefix: String,
}

impl DirectoryCapture {
    /// Write stills rendered by `still` into `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>, still: StillCapture) -> Self {
        Self {
            still,
            directory: directory.into(),
            prefix: "docsnap".to_owned(),
        }
    }

    /// File name prefix (default `docsnap`).
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Destination directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// `<prefix>-<unix millis>.<ext>`, with a counter appended if that
    /// name is already taken.
    fn file_name_for(&self, format: StillFormat) -> PathBuf {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        let ext = format.extension();

        let mut path = self.directory.join(format!("{}-{millis}.{ext}", self.prefix));
        let mut n = 1_u32;
        while path.exists() {
            path = self
                .directory
                .join(format!("{}-{millis}-{n}.{ext}", self.prefix));
            n += 1;
        }
        path
    }
}

impl CaptureSink for DirectoryCapture {
    fn capture(
        &mut self,
        frame: &RgbaImage,
        trigger: &CaptureTrigger,
    ) -> Result<Still, CaptureError> {
        let mut still = self.still.capture(frame, trigger)?;

        std::fs::create_dir_all(&self.directory).map_err(|source| CaptureError::Io {
            path: self.directory.clone(),
            source,
        })?;
        let path = self.file_name_for(still.format);
        std::fs::write(&path, &still.bytes).map_err(|source| CaptureError::Io {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), bytes = still.bytes.len(), "still written");
        still.path = Some(path);
        Ok(still)
    }
}
