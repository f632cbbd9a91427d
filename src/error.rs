//! Error types for the `framesync` crate.
//!
//! This module defines [`FrameSyncError`], the unified error type returned by
//! every fallible operation in the crate, together with
//! [`ToleranceViolation`], the per-request detail carried by a tolerance
//! failure.
//!
//! Nothing in the crate retries or downgrades these errors. A tolerance
//! violation in particular fails the whole batch: callers decide whether to
//! drop the sample, re-collect it, or abort.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    path::PathBuf,
};

use ffmpeg_next::Error as FfmpegError;
use image::ImageError;
use thiserror::Error;

/// A requested timestamp whose nearest decodable frame lies outside the
/// tolerance window.
#[derive(Debug, Clone, PartialEq)]
pub struct ToleranceViolation {
    /// The requested timestamp in seconds.
    pub requested: f64,
    /// Timestamp of the closest frame that was loaded, if any frame was
    /// loaded at all.
    pub nearest: Option<f64>,
    /// Absolute distance between `requested` and `nearest`.
    /// `f64::INFINITY` when no frame was loaded.
    pub distance: f64,
}

impl Display for ToleranceViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.nearest {
            Some(nearest) => write!(
                f,
                "{:.4}s (nearest frame {:.4}s, off by {:.4}s)",
                self.requested, nearest, self.distance
            ),
            None => write!(f, "{:.4}s (no frame loaded)", self.requested),
        }
    }
}

fn format_violations(violations: &[ToleranceViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_duration(duration: &f64) -> String {
    if *duration > 0.0 {
        format!("{duration:.4}s")
    } else {
        "an unknown time".to_string()
    }
}

fn describe_exit_code(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(|| "none".to_string(), |code| code.to_string())
}

/// The unified error type for all `framesync` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameSyncError {
    /// The video file is missing, unreadable, has no video stream, or uses
    /// a codec without an available decoder.
    #[error("Failed to open video at {path}: {reason}")]
    Resource {
        /// Path that was passed to [`VideoStream::open`](crate::VideoStream::open).
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// A timestamp lies outside the bounds of the stream.
    #[error(
        "Cannot seek to {timestamp:.4}s: stream starts at {start:.4}s and lasts {}",
        describe_duration(.duration)
    )]
    Seek {
        /// The requested timestamp in seconds.
        timestamp: f64,
        /// Presentation timestamp of the stream start in seconds.
        start: f64,
        /// The stream duration in seconds.
        duration: f64,
    },

    /// One or more requested timestamps have no frame within the tolerance.
    ///
    /// The closest frame that can be decoded is too far away in time, which
    /// usually means timestamps were desynchronized during data collection.
    #[error(
        "{} requested timestamp(s) violate the tolerance of {tolerance}s: {}",
        .violations.len(),
        format_violations(.violations)
    )]
    ToleranceExceeded {
        /// Exactly the requests that failed, in request order.
        violations: Vec<ToleranceViolation>,
        /// The configured tolerance in seconds.
        tolerance: f64,
    },

    /// A multi-frame request spans more than one video file.
    #[error("Key `{key}` references {} different videos; all frames of a key must share one video", .paths.len())]
    UnsupportedBatch {
        /// The dataset key holding the mixed references.
        key: String,
        /// The distinct resolved paths, in first-seen order.
        paths: Vec<PathBuf>,
    },

    /// The requested decode backend is not implemented.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// A frame buffer does not match its declared shape.
    #[error("Malformed frame buffer: {0}")]
    Format(String),

    /// The external encoder failed.
    #[error("Video encoding failed (exit code {}): {stderr}", describe_exit_code(.exit_code))]
    Encoding {
        /// Process exit code, `None` if the process could not be launched or
        /// was terminated by a signal.
        exit_code: Option<i32>,
        /// Captured standard error of the encoder.
        stderr: String,
    },

    /// An option value is out of range or unrecognised.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A dataset item is missing a key or holds the wrong kind of value.
    #[error("Invalid dataset item at key `{key}`: {reason}")]
    InvalidItem {
        /// The offending key.
        key: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecode(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate while reading or writing frames.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for FrameSyncError {
    fn from(error: FfmpegError) -> Self {
        FrameSyncError::Ffmpeg(error.to_string())
    }
}
