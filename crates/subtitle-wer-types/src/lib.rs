//! Shared domain models for the subtitle-wer workspace.
//!
//! This crate centralizes lightweight data structures used across decoder,
//! OCR, scoring, and CLI crates. Keep it backend-agnostic and avoid
//! platform-specific dependencies so all crates can depend on it without
//! pulling native SDKs or heavy features.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub type FrameResult<T> = Result<T, FrameError>;

/// Decoded luminance image for a single sampled instant.
#[derive(Clone)]
pub struct YPlaneFrame {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for YPlaneFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YPlaneFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl YPlaneFrame {
    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        if stride < width as usize {
            return Err(FrameError::InvalidFrame {
                reason: format!("stride {stride} is narrower than width {width}"),
            });
        }
        let required =
            stride
                .checked_mul(height as usize)
                .ok_or_else(|| FrameError::InvalidFrame {
                    reason: "calculated Y plane length overflowed".into(),
                })?;
        if data.len() < required {
            return Err(FrameError::InvalidFrame {
                reason: format!(
                    "insufficient Y plane bytes: got {} expected at least {}",
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
            data: Arc::from(data.into_boxed_slice()),
            frame_index: None,
        })
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

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    /// Region covering every pixel of this frame.
    pub fn full_region(&self) -> RecognitionRegion {
        RecognitionRegion::new(0, 0, self.width, self.height)
    }

    pub fn contains(&self, region: &RecognitionRegion) -> bool {
        region.fits_within(self.width, self.height)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("failed to decode frame at {:.3}s: {message}", .timestamp.as_secs_f64())]
    Decode {
        timestamp: Duration,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn decode(timestamp: Duration, message: impl Into<String>) -> Self {
        Self::Decode {
            timestamp,
            message: message.into(),
        }
    }
}

/// Pixel rectangle sampled for recognition, constant for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecognitionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RecognitionRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bottom band of a `width` x `height` frame covering `fraction` of its height.
    pub fn bottom_band(width: u32, height: u32, fraction: f32) -> Self {
        let fraction = fraction.clamp(0.0, 1.0);
        let top = (height as f32 * (1.0 - fraction)).round() as u32;
        let top = top.min(height.saturating_sub(1));
        Self::new(0, top, width, height - top)
    }

    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn fits_within(&self, frame_width: u32, frame_height: u32) -> bool {
        !self.is_empty()
            && self.right() <= u64::from(frame_width)
            && self.bottom() <= u64::from(frame_height)
    }

    pub fn to_ocr_region(&self) -> OcrRegion {
        OcrRegion::new(
            self.x as f32,
            self.y as f32,
            self.width as f32,
            self.height as f32,
        )
    }
}

impl fmt::Display for RecognitionRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("region '{input}' must be four comma-separated integers: x,y,width,height")]
pub struct ParseRegionError {
    pub input: String,
}

impl FromStr for RecognitionRegion {
    type Err = ParseRegionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseRegionError {
            input: s.to_string(),
        };
        let parts = s
            .split(',')
            .map(|part| part.trim().parse::<u32>().map_err(|_| err()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [x, y, width, height] => Ok(Self::new(*x, *y, *width, *height)),
            _ => Err(err()),
        }
    }
}

/// Bounding box reported by a recognition engine, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OcrRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl OcrRegion {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrText {
    pub region: OcrRegion,
    pub text: String,
    pub confidence: Option<f32>,
}

impl OcrText {
    pub fn new(region: OcrRegion, text: String) -> Self {
        Self {
            region,
            text,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, value: f32) -> Self {
        self.confidence = Some(value);
        self
    }
}

/// Candidates produced by one recognition call, in detection order.
#[derive(Debug, Clone)]
pub struct OcrResponse {
    pub texts: Vec<OcrText>,
}

impl OcrResponse {
    pub fn new(texts: Vec<OcrText>) -> Self {
        Self { texts }
    }

    pub fn empty() -> Self {
        Self { texts: Vec::new() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineOutcome {
    Success,
    Timeout,
    EngineError,
    EmptyResult,
}

impl EngineOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineOutcome::Success => "success",
            EngineOutcome::Timeout => "timeout",
            EngineOutcome::EngineError => "engine_error",
            EngineOutcome::EmptyResult => "empty_result",
        }
    }

    /// Timeouts and engine errors count toward the consecutive-failure guard.
    pub fn is_failure(&self) -> bool {
        matches!(self, EngineOutcome::Timeout | EngineOutcome::EngineError)
    }
}

impl fmt::Display for EngineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of recognizing one sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleObservation {
    pub timestamp: Duration,
    pub raw_text: String,
    pub outcome: EngineOutcome,
}

impl SampleObservation {
    pub fn success(timestamp: Duration, raw_text: String) -> Self {
        Self {
            timestamp,
            raw_text,
            outcome: EngineOutcome::Success,
        }
    }

    pub fn without_text(timestamp: Duration, outcome: EngineOutcome) -> Self {
        Self {
            timestamp,
            raw_text: String::new(),
            outcome,
        }
    }
}

/// A timed subtitle entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

impl SubtitleCue {
    pub fn new(start: Duration, end: Duration, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}
