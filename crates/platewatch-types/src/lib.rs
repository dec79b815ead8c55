//! Shared domain models for the platewatch workspace.
//!
//! This crate centralizes the lightweight data structures used across the
//! detector, OCR, and pipeline crates. Keep it backend-agnostic and free of
//! heavy dependencies so every crate can depend on it without pulling native
//! SDKs or network stacks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub type FrameResult<T> = Result<T, SourceError>;

/// Immutable 8-bit grayscale frame or sub-image.
///
/// Pixel data is shared behind an `Arc`, so clones are cheap and a frame can
/// be retained for display while the pipeline moves on.
#[derive(Clone)]
pub struct GrayImage {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for GrayImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrayImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl GrayImage {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> Result<Self, ImageError> {
        let required = stride
            .checked_mul(height as usize)
            .ok_or_else(|| ImageError::InvalidFrame {
                reason: "calculated plane length overflowed".into(),
            })?;
        if data.len() < required {
            return Err(ImageError::InvalidFrame {
                reason: format!(
                    "insufficient plane bytes: got {} expected at least {}",
                    data.len(),
                    required
                ),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            timestamp,
            frame_index: None,
            data: Arc::from(data.into_boxed_slice()),
        })
    }

    /// Packed-row constructor (`stride == width`).
    pub fn from_pixels(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ImageError> {
        Self::from_owned(width, height, width as usize, None, data)
    }

    pub fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            stride: 0,
            frame_index: None,
            timestamp: None,
            data: Arc::from(Vec::new().into_boxed_slice()),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<Duration>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// One row of pixels, `width` bytes long.
    pub fn row(&self, y: u32) -> &[u8] {
        let offset = y as usize * self.stride;
        &self.data[offset..offset + self.width as usize]
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.stride + x as usize]
    }

    /// Copies the pixels into a packed `width * height` vector, dropping any
    /// stride padding.
    pub fn to_packed_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    /// Owned copy of the pixels under `region`, clamped to the frame bounds.
    /// A region with no overlap yields an empty image.
    pub fn crop(&self, region: Region) -> GrayImage {
        let Some(clamped) = region.clamp_to(self.width, self.height) else {
            return GrayImage::empty();
        };
        let mut data = Vec::with_capacity((clamped.width * clamped.height) as usize);
        for y in clamped.y..clamped.y + clamped.height {
            let offset = y as usize * self.stride + clamped.x as usize;
            data.extend_from_slice(&self.data[offset..offset + clamped.width as usize]);
        }
        GrayImage {
            width: clamped.width,
            height: clamped.height,
            stride: clamped.width as usize,
            frame_index: self.frame_index,
            timestamp: self.timestamp,
            data: Arc::from(data.into_boxed_slice()),
        }
    }

    /// Full-frame bounds as a region.
    pub fn bounds(&self) -> Region {
        Region::new(0, 0, self.width, self.height)
    }
}

/// Axis-aligned rectangle in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Normalized bounding box of two corner points. Width and height are
    /// always non-negative regardless of drag direction.
    pub fn from_corners(a: Point, b: Point) -> Self {
        let x1 = a.x.min(b.x).max(0);
        let y1 = a.y.min(b.y).max(0);
        let x2 = a.x.max(b.x).max(0);
        let y2 = a.y.max(b.y).max(0);
        Self {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }

    /// Intersection with `0..w x 0..h`, or `None` when nothing remains.
    pub fn clamp_to(&self, w: u32, h: u32) -> Option<Region> {
        if self.x >= w || self.y >= h {
            return None;
        }
        let width = self.width.min(w - self.x);
        let height = self.height.min(h - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Region::new(self.x, self.y, width, height))
    }

    /// Translates a region expressed in a crop's local coordinates back into
    /// the parent frame coordinates the crop was taken from.
    pub fn offset_by(&self, origin: Region) -> Region {
        Region::new(
            self.x + origin.x,
            self.y + origin.y,
            self.width,
            self.height,
        )
    }
}

/// Pointer coordinate used by ROI selection. Signed so that drags which leave
/// the frame on the top or left side still normalize correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Outcome of one recognition submission.
///
/// Empty text means "no plate read"; confidence is meaningful only for
/// non-empty text and is forced to zero otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: f32,
}

impl RecognitionResult {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        let text = text.into();
        let confidence = if text.is_empty() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { text, confidence }
    }

    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },
}

/// Frame-source failures. Opening errors are terminal for a pipeline run;
/// everything else ends the stream.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("failed to open source '{source_spec}': {message}")]
    OpenFailure {
        source_spec: String,
        message: String,
    },

    #[error("{backend} source failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("invalid source spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn open_failure(source_spec: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OpenFailure {
            source_spec: source_spec.into(),
            message: message.into(),
        }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_owned_rejects_short_buffers() {
        let err = GrayImage::from_owned(4, 4, 4, None, vec![0; 8]);
        assert!(err.is_err());
    }

    #[test]
    fn crop_respects_stride_and_bounds() {
        let mut data = vec![0u8; 6 * 4];
        // stride 6, width 4: two padding bytes per row must not leak into crops
        for y in 0..4usize {
            for x in 0..4usize {
                data[y * 6 + x] = (y * 10 + x) as u8;
            }
        }
        let image = GrayImage::from_owned(4, 4, 6, None, data).unwrap();
        let crop = image.crop(Region::new(1, 1, 2, 2));
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
        assert_eq!(crop.data(), &[11, 12, 21, 22]);
    }

    #[test]
    fn crop_outside_bounds_is_empty() {
        let image = GrayImage::from_pixels(4, 4, vec![0; 16]).unwrap();
        assert!(image.crop(Region::new(10, 10, 2, 2)).is_empty());
        assert!(image.crop(Region::new(0, 0, 0, 5)).is_empty());
    }

    #[test]
    fn region_from_corners_normalizes() {
        let rect = Region::from_corners(Point::new(30, 40), Point::new(10, 5));
        assert_eq!(rect, Region::new(10, 5, 20, 35));
        let degenerate = Region::from_corners(Point::new(7, 7), Point::new(7, 7));
        assert_eq!(degenerate.area(), 0);
    }

    #[test]
    fn empty_result_has_zero_confidence() {
        let result = RecognitionResult::new("", 0.9);
        assert_eq!(result.confidence, 0.0);
        assert!(result.is_empty());
        let clamped = RecognitionResult::new("A123BC", 1.7);
        assert_eq!(clamped.confidence, 1.0);
    }
}
