//! Key frame index.
//!
//! Seeking always lands on a key frame, so the spacing between key frames
//! bounds how many frames a match has to decode before reaching its first
//! request. [`VideoStream::keyframes`] lists them by reading packets only.
//!
//! # Example
//!
//! ```no_run
//! use framesync::{Device, VideoStream};
//!
//! let mut stream = VideoStream::open("videos/episode_000000.mp4", Device::Cpu)?;
//! let index = stream.keyframes()?;
//! println!("{} key frames, largest GOP {} packets", index.keyframes.len(), index.max_gop_size);
//! # Ok::<(), framesync::FrameSyncError>(())
//! ```

use ffmpeg_next::{Error as FfmpegError, Packet};
use serde::Serialize;

use crate::error::FrameSyncError;
use crate::reader::VideoStream;
use crate::utilities::pts_to_seconds;

/// One key frame (sync point) of the video stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFrameInfo {
    /// 0-based index of the packet among the stream's video packets.
    pub packet_number: u64,
    /// Presentation timestamp in stream time-base units, if the packet has one.
    pub pts: Option<i64>,
    /// Presentation timestamp in seconds.
    pub timestamp: Option<f64>,
    /// Packet size in bytes.
    pub size: usize,
}

/// Key frames of a stream and the group-of-pictures sizes between them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFrameIndex {
    /// Key frames in packet order.
    pub keyframes: Vec<KeyFrameInfo>,
    /// Packets from each key frame up to the next one (or the end).
    pub gop_sizes: Vec<u64>,
    /// Largest entry of `gop_sizes`, 0 without key frames.
    pub max_gop_size: u64,
    /// Total number of video packets scanned.
    pub total_video_packets: u64,
}

fn gop_sizes(keyframes: &[KeyFrameInfo], total_packets: u64) -> Vec<u64> {
    keyframes
        .iter()
        .enumerate()
        .map(|(index, keyframe)| {
            let end = keyframes
                .get(index + 1)
                .map_or(total_packets, |next| next.packet_number);
            end - keyframe.packet_number
        })
        .collect()
}

impl VideoStream {
    /// Scan every packet of the video stream and list its key frames.
    ///
    /// Nothing is decoded. The stream is rewound to the start afterwards, so
    /// the next [`seek`](crate::FrameSource::seek) starts from a clean state.
    pub fn keyframes(&mut self) -> Result<KeyFrameIndex, FrameSyncError> {
        log::debug!("Scanning key frames of {}", self.path().display());
        self.reposition(0)?;

        let mut keyframes = Vec::new();
        let mut video_packets: u64 = 0;
        let mut packet = Packet::empty();
        loop {
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    if packet.is_key() {
                        let pts = packet.pts();
                        keyframes.push(KeyFrameInfo {
                            packet_number: video_packets,
                            pts,
                            timestamp: pts.map(|pts| pts_to_seconds(pts, self.time_base)),
                            size: packet.size(),
                        });
                    }
                    video_packets += 1;
                }
                Err(FfmpegError::Eof) => break,
                Err(error) => return Err(FrameSyncError::from(error)),
            }
        }

        self.reposition(0)?;

        let gop_sizes = gop_sizes(&keyframes, video_packets);
        let max_gop_size = gop_sizes.iter().copied().max().unwrap_or(0);
        log::debug!(
            "Found {} key frames in {video_packets} packets",
            keyframes.len()
        );

        Ok(KeyFrameIndex {
            keyframes,
            gop_sizes,
            max_gop_size,
            total_video_packets: video_packets,
        })
    }
}
