//! Seekable, pull-based video frame reader.
//!
//! [`VideoStream`] wraps one FFmpeg demuxer, decoder, and RGB24 scaler for a
//! single video file. [`seek`](VideoStream::seek) lands on the key frame at
//! or before the target and [`next_frame`](VideoStream::next_frame) decodes
//! forward from there, one frame per call, in presentation order.
//!
//! The [`FrameSource`] trait captures exactly what the
//! [matcher](crate::matcher) needs from a reader, so the matching logic does
//! not depend on FFmpeg.
//!
//! # Example
//!
//! ```no_run
//! use framesync::{Device, FrameSource, VideoStream};
//!
//! let mut stream = VideoStream::open("videos/episode_000000.mp4", Device::Cpu)?;
//! stream.seek(1.5)?;
//! while let Some(frame) = stream.next_frame()? {
//!     println!("pts={:.3}s {}x{}", frame.timestamp, frame.width, frame.height);
//!     if frame.timestamp >= 2.0 {
//!         break;
//!     }
//! }
//! # Ok::<(), framesync::FrameSyncError>(())
//! ```

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbImage};

use crate::configuration::Device;
use crate::error::FrameSyncError;
use crate::metadata::VideoMetadata;

/// A decoded frame and its presentation timestamp.
///
/// `data` is interleaved RGB24, `height * width * 3` bytes, row-major.
#[derive(Clone, PartialEq)]
pub struct DecodedFrame {
    /// Presentation timestamp in seconds.
    pub timestamp: f64,
    /// Presentation timestamp in stream time-base units.
    pub pts: i64,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Packed RGB24 pixels.
    pub data: Vec<u8>,
}

impl DecodedFrame {
    /// Channels per pixel in [`data`](DecodedFrame::data).
    pub const CHANNELS: usize = 3;

    /// Copy the pixels into an [`image::DynamicImage`].
    ///
    /// # Errors
    ///
    /// [`FrameSyncError::Format`] if `data` does not hold `width * height`
    /// RGB pixels.
    pub fn to_image(&self) -> Result<DynamicImage, FrameSyncError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| {
                FrameSyncError::Format(format!(
                    "{} bytes cannot hold a {}x{} RGB frame",
                    self.data.len(),
                    self.width,
                    self.height
                ))
            })
    }
}

impl Debug for DecodedFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("DecodedFrame")
            .field("timestamp", &self.timestamp)
            .field("pts", &self.pts)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A forward-only source of timestamped frames that can be repositioned.
///
/// Implementations own their decode cursor exclusively; callers must not
/// interleave seeks from several users of the same source.
pub trait FrameSource {
    /// Length of the stream in seconds. Values `<= 0` mean unknown.
    fn duration_seconds(&self) -> f64;

    /// Timestamp of the first frame in seconds.
    fn start_seconds(&self) -> f64 {
        0.0
    }

    /// Reposition so that the next frame returned is the key frame at or
    /// before `timestamp` seconds.
    ///
    /// # Errors
    ///
    /// [`FrameSyncError::Seek`] if `timestamp` is outside the stream.
    fn seek(&mut self, timestamp: f64) -> Result<(), FrameSyncError>;

    /// Decode the next frame in presentation order, `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameSyncError>;
}

/// Check `timestamp` against `[start, start + duration]`; an unknown
/// duration only enforces the lower bound.
pub(crate) fn check_stream_bounds(
    timestamp: f64,
    start: f64,
    duration: f64,
) -> Result<(), FrameSyncError> {
    let upper_ok = duration <= 0.0 || timestamp <= start + duration;
    if timestamp.is_finite() && timestamp >= start && upper_ok {
        Ok(())
    } else {
        Err(FrameSyncError::Seek {
            timestamp,
            start,
            duration,
        })
    }
}

/// An open video file positioned for decoding.
///
/// Dropping the handle closes the demuxer, decoder, and scaler.
pub struct VideoStream {
    pub(crate) input_context: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    pub(crate) stream_index: usize,
    pub(crate) time_base: Rational,
    metadata: VideoMetadata,
    path: PathBuf,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    eof_sent: bool,
    done: bool,
}

impl Debug for VideoStream {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoStream")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .field("eof_sent", &self.eof_sent)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl VideoStream {
    /// Open the best video stream of the file at `path`.
    ///
    /// # Errors
    ///
    /// - [`FrameSyncError::NotSupported`] for [`Device::Cuda`], before the
    ///   file is touched.
    /// - [`FrameSyncError::Resource`] if the file is missing or unreadable,
    ///   has no video stream, or its codec cannot be decoded.
    pub fn open<P: AsRef<Path>>(path: P, device: Device) -> Result<Self, FrameSyncError> {
        let path = path.as_ref().to_path_buf();

        if device == Device::Cuda {
            return Err(FrameSyncError::NotSupported(
                "GPU video decoding (device `cuda`) is not implemented".to_string(),
            ));
        }

        let resource_error = |reason: String| FrameSyncError::Resource {
            path: path.clone(),
            reason,
        };

        log::debug!("Opening video stream: {}", path.display());

        ffmpeg_next::init()
            .map_err(|error| resource_error(format!("FFmpeg initialisation failed: {error}")))?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| resource_error(error.to_string()))?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or_else(|| resource_error("no video stream found".to_string()))?;
        let stream_index = stream.index();
        let time_base = stream.time_base();

        let decoder_context = CodecContext::from_parameters(stream.parameters())
            .map_err(|error| resource_error(format!("unreadable codec parameters: {error}")))?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| resource_error(format!("unsupported video codec: {error}")))?;

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            f64::from(frame_rate.numerator()) / f64::from(frame_rate.denominator())
        } else {
            0.0
        };

        let stream_start = stream.start_time();
        let start_time = if stream_start != ffmpeg_sys_next::AV_NOPTS_VALUE && stream_start > 0 {
            Duration::from_secs_f64(crate::utilities::pts_to_seconds(stream_start, time_base))
        } else {
            Duration::ZERO
        };

        let stream_duration = stream.duration();
        let duration = if stream_duration > 0 {
            Duration::from_secs_f64(crate::utilities::pts_to_seconds(
                stream_duration,
                time_base,
            ))
        } else if input_context.duration() > 0 {
            Duration::from_micros(input_context.duration() as u64)
        } else {
            Duration::ZERO
        };

        let width = decoder.width();
        let height = decoder.height();
        let pixel_format = match decoder.format() {
            Pixel::None => None,
            format => Some(format!("{format:?}")),
        };
        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let scaler = ScalingContext::get(
            decoder.format(),
            width,
            height,
            Pixel::RGB24,
            width,
            height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|error| resource_error(format!("cannot convert frames to RGB24: {error}")))?;

        let metadata = VideoMetadata {
            width,
            height,
            frames_per_second,
            start_time,
            duration,
            frame_count: (duration.as_secs_f64() * frames_per_second).round() as u64,
            codec,
            pixel_format,
            stream_index,
        };

        log::debug!(
            "Opened {}: {}x{}, {:.2} fps, {:.3}s, codec={}",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.frames_per_second,
            metadata.duration_seconds(),
            metadata.codec,
        );

        Ok(Self {
            input_context,
            decoder,
            scaler,
            stream_index,
            time_base,
            metadata,
            path,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            eof_sent: false,
            done: false,
        })
    }

    /// Metadata captured when the stream was opened.
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// Path the stream was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seek the demuxer to `seek_target` (AV_TIME_BASE units) and discard
    /// everything the decoder still buffers.
    pub(crate) fn reposition(&mut self, seek_target: i64) -> Result<(), FrameSyncError> {
        self.input_context.seek(seek_target, ..seek_target)?;
        self.decoder.flush();
        self.eof_sent = false;
        self.done = false;
        Ok(())
    }

    fn convert_current_frame(&mut self, pts: i64) -> Result<DecodedFrame, FrameSyncError> {
        self.scaler.run(&self.decoded_frame, &mut self.rgb_frame)?;

        let width = self.metadata.width;
        let height = self.metadata.height;
        let data =
            crate::utilities::frame_to_buffer(&self.rgb_frame, width, height, DecodedFrame::CHANNELS);

        Ok(DecodedFrame {
            timestamp: crate::utilities::pts_to_seconds(pts, self.time_base),
            pts,
            width,
            height,
            data,
        })
    }
}

impl FrameSource for VideoStream {
    fn duration_seconds(&self) -> f64 {
        self.metadata.duration_seconds()
    }

    fn start_seconds(&self) -> f64 {
        self.metadata.start_seconds()
    }

    fn seek(&mut self, timestamp: f64) -> Result<(), FrameSyncError> {
        let start = self.start_seconds();
        let duration = self.duration_seconds();
        check_stream_bounds(timestamp, start, duration)?;
        log::debug!("Seeking {} to {timestamp:.4}s", self.path.display());
        self.reposition(crate::utilities::seconds_to_seek_timestamp(timestamp))
            .map_err(|error| {
                log::debug!("Seek to {timestamp:.4}s failed: {error}");
                FrameSyncError::Seek {
                    timestamp,
                    start,
                    duration,
                }
            })
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameSyncError> {
        loop {
            if self.done {
                return Ok(None);
            }

            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                let Some(pts) = self.decoded_frame.timestamp().or(self.decoded_frame.pts()) else {
                    log::debug!("Skipping decoded frame without a timestamp");
                    continue;
                };
                return self.convert_current_frame(pts).map(Some);
            }

            // The decoder is drained; feed it more packets.
            if self.eof_sent {
                self.done = true;
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(ffmpeg_next::Error::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    return Err(FrameSyncError::VideoDecode(format!(
                        "failed to read packet from {}: {error}",
                        self.path.display()
                    )));
                }
            }
        }
    }
}

impl Iterator for VideoStream {
    type Item = Result<DecodedFrame, FrameSyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(frame) => frame.map(Ok),
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

impl Drop for VideoStream {
    fn drop(&mut self) {
        log::debug!("Closing video stream: {}", self.path.display());
    }
}
