//! Decode and encode configuration.
//!
//! [`DecodeOptions`] threads the tolerance, decode backend, and diagnostic
//! settings through the matcher and the batch assembler. [`EncodeOptions`]
//! carries the encoder's fixed argument template.
//!
//! # Example
//!
//! ```
//! use framesync::{DecodeOptions, Device, EncodeOptions};
//!
//! let decode = DecodeOptions::new(0.04)
//!     .with_device(Device::Cpu)
//!     .with_log_loaded_timestamps(true);
//! assert_eq!(decode.tolerance_s(), 0.04);
//!
//! let encode = EncodeOptions::new(30).with_overwrite(true);
//! assert_eq!(encode.fps(), 30);
//! ```

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::error::FrameSyncError;
use crate::ffmpeg::FfmpegLogLevel;

/// Decode backend used to open video streams.
///
/// The backend is an explicit parameter of [`VideoStream::open`](crate::VideoStream::open)
/// rather than process-wide state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Software decoding through the FFmpeg libraries. This is the default.
    #[default]
    Cpu,
    /// Reserved for GPU decoding. Opening a stream with this device fails
    /// with [`FrameSyncError::NotSupported`]; there is no fallback to `Cpu`.
    Cuda,
}

impl Display for Device {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda => f.write_str("cuda"),
        }
    }
}

impl FromStr for Device {
    type Err = FrameSyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda),
            other => Err(FrameSyncError::InvalidConfiguration(format!(
                "unknown device `{other}` (expected cpu or cuda)"
            ))),
        }
    }
}

/// Settings for timestamp-matched frame retrieval.
///
/// `tolerance_s` has no default: every caller must state how far a decoded
/// frame may be from the requested timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOptions {
    pub(crate) tolerance_s: f64,
    pub(crate) device: Device,
    pub(crate) log_loaded_timestamps: bool,
}

impl DecodeOptions {
    /// Create options with the given tolerance in seconds, the `Cpu`
    /// backend, and diagnostics off.
    pub fn new(tolerance_s: f64) -> Self {
        Self {
            tolerance_s,
            device: Device::Cpu,
            log_loaded_timestamps: false,
        }
    }

    /// Set the decode backend.
    #[must_use]
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Log every loaded frame timestamp and every chosen timestamp at
    /// `info` level. Purely observational.
    #[must_use]
    pub fn with_log_loaded_timestamps(mut self, enabled: bool) -> Self {
        self.log_loaded_timestamps = enabled;
        self
    }

    /// Maximum accepted distance in seconds (exclusive).
    pub fn tolerance_s(&self) -> f64 {
        self.tolerance_s
    }

    /// The configured decode backend.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Whether diagnostic timestamp logging is enabled.
    pub fn log_loaded_timestamps(&self) -> bool {
        self.log_loaded_timestamps
    }

    /// Reject tolerances that cannot describe a window.
    pub(crate) fn validate(&self) -> Result<(), FrameSyncError> {
        if !self.tolerance_s.is_finite() || self.tolerance_s <= 0.0 {
            return Err(FrameSyncError::InvalidConfiguration(format!(
                "tolerance_s must be a positive finite number, got {}",
                self.tolerance_s
            )));
        }
        Ok(())
    }
}

/// Image-sequence pattern the encoder reads: `frame_000000.png`, ...
pub const FRAME_FILE_PATTERN: &str = "frame_%06d.png";

/// Index of the first image in the sequence.
pub const FRAME_START_NUMBER: u32 = 0;

/// Settings for the external encoder invocation.
///
/// The defaults (`libx264`, `yuv444p`) are chosen so that every
/// environment produces the same decoded pixels, not for file size.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub(crate) fps: u32,
    pub(crate) video_codec: String,
    pub(crate) pixel_format: String,
    pub(crate) log_level: FfmpegLogLevel,
    pub(crate) ffmpeg_binary: PathBuf,
    pub(crate) overwrite: bool,
}

impl EncodeOptions {
    /// Create options for a constant frame rate of `fps`.
    pub fn new(fps: u32) -> Self {
        Self {
            fps,
            video_codec: "libx264".to_string(),
            pixel_format: "yuv444p".to_string(),
            log_level: FfmpegLogLevel::Error,
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            overwrite: false,
        }
    }

    /// Override the video codec passed to `-vcodec`.
    #[must_use]
    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    /// Override the pixel format passed to `-pix_fmt`.
    #[must_use]
    pub fn with_pixel_format(mut self, pixel_format: impl Into<String>) -> Self {
        self.pixel_format = pixel_format.into();
        self
    }

    /// Set the encoder's own console verbosity.
    #[must_use]
    pub fn with_log_level(mut self, level: FfmpegLogLevel) -> Self {
        self.log_level = level;
        self
    }

    /// Use a specific `ffmpeg` executable instead of the one on `PATH`.
    #[must_use]
    pub fn with_ffmpeg_binary<P: AsRef<Path>>(mut self, binary: P) -> Self {
        self.ffmpeg_binary = binary.as_ref().to_path_buf();
        self
    }

    /// Replace an existing output file (`-y`) instead of failing (`-n`).
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Frames per second of the produced video.
    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Codec name passed to the encoder.
    pub fn video_codec(&self) -> &str {
        &self.video_codec
    }

    /// Pixel format name passed to the encoder.
    pub fn pixel_format(&self) -> &str {
        &self.pixel_format
    }

    /// The executable that will be launched.
    pub fn ffmpeg_binary(&self) -> &Path {
        &self.ffmpeg_binary
    }

    pub(crate) fn validate(&self) -> Result<(), FrameSyncError> {
        if self.fps == 0 {
            return Err(FrameSyncError::InvalidConfiguration(
                "fps must be greater than zero".to_string(),
            ));
        }
        if self.video_codec.is_empty() || self.pixel_format.is_empty() {
            return Err(FrameSyncError::InvalidConfiguration(
                "video codec and pixel format must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
