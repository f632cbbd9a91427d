//! Video stream metadata.
//!
//! [`VideoMetadata`] is captured once when a [`VideoStream`](crate::VideoStream)
//! is opened and cached for the lifetime of the handle. It backs the seek
//! bounds check and the `info` command.

use std::time::Duration;

use serde::Serialize;

/// Properties of the decoded video stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct VideoMetadata {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frames per second, `0.0` if the container does not say.
    pub frames_per_second: f64,
    /// Presentation timestamp of the first frame. Frame timestamps are
    /// absolute, so requests are valid from here on.
    pub start_time: Duration,
    /// Stream duration. Falls back to the container duration when the
    /// stream carries none.
    pub duration: Duration,
    /// Frame count estimated from duration and frame rate.
    pub frame_count: u64,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
    /// Decoder pixel format name (e.g. `"YUV444P"`), if known.
    pub pixel_format: Option<String>,
    /// Index of the stream inside the container.
    pub stream_index: usize,
}

impl VideoMetadata {
    /// Duration in seconds, the unit requested timestamps are expressed in.
    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// Start of the stream in seconds.
    pub fn start_seconds(&self) -> f64 {
        self.start_time.as_secs_f64()
    }
}
