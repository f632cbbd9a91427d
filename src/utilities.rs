//! Internal utility functions.
//!
//! Pixel-plane copying and timestamp conversion shared by the reader and the
//! keyframe scan.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};

/// Copy the first plane of a packed frame into a tightly packed buffer.
///
/// FFmpeg rows are often padded (stride > width * bytes per pixel); the
/// padding is dropped so the result is exactly `height * width * bpp` bytes.
pub(crate) fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_length = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == row_length {
        data[..row_length * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_length * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_length]);
        }
        buffer
    }
}

/// Rescale a PTS value from the stream time base to seconds.
pub(crate) fn pts_to_seconds(pts: i64, time_base: Rational) -> f64 {
    pts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator().max(1))
}

/// Convert seconds to a container-level seek target.
///
/// `Input::seek` goes through `avformat_seek_file` with `stream_index = -1`,
/// which expects AV_TIME_BASE units (microseconds).
pub(crate) fn seconds_to_seek_timestamp(seconds: f64) -> i64 {
    (seconds * f64::from(ffmpeg_sys_next::AV_TIME_BASE)).floor() as i64
}
