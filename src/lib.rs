//! # framesync
//!
//! Timestamp-synchronized frame retrieval from compressed videos.
//!
//! Robot learning datasets store camera streams as video files and refer to
//! individual frames by `(video path, timestamp)`. `framesync` decodes those
//! frames on demand, checks that each decoded frame really is the one that
//! was asked for (within a tolerance), and hands them out as channel-first
//! `f32` tensors, powered by FFmpeg via the
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) crate.
//!
//! ## Quick Start
//!
//! ### Decode Frames at Timestamps
//!
//! ```no_run
//! use framesync::{DecodeOptions, decode_frames_at};
//!
//! let options = DecodeOptions::new(1e-4);
//! let frames = decode_frames_at("videos/episode_000000.mp4", &[0.0, 0.1, 0.2], &options).unwrap();
//! assert_eq!(frames[0].shape().0, 3);
//! ```
//!
//! ### Resolve a Dataset Item
//!
//! ```no_run
//! use std::path::Path;
//!
//! use framesync::{DatasetItem, DecodeOptions, resolve};
//! use serde_json::json;
//!
//! let mut item = DatasetItem::from_json(
//!     json!({
//!         "observation.image": [
//!             {"path": "videos/episode_000000.mp4", "timestamp": 0.1},
//!             {"path": "videos/episode_000000.mp4", "timestamp": 0.2}
//!         ]
//!     }),
//!     &["observation.image"],
//! )
//! .unwrap();
//! resolve(&mut item, &["observation.image"], Path::new("data/videos"), &DecodeOptions::new(1e-4))
//!     .unwrap();
//! ```
//!
//! ### Encode an Image Sequence
//!
//! ```no_run
//! use framesync::{EncodeOptions, encode_video_frames};
//!
//! encode_video_frames("frames", "videos/episode_000000.mp4", &EncodeOptions::new(30)).unwrap();
//! ```
//!
//! ## Features
//!
//! - **Nearest-timestamp matching** with a strict tolerance; violations fail
//!   the whole request instead of substituting a far-away frame
//! - **Efficient seeking**: one seek to the key frame before the earliest
//!   request, then a forward decode up to the latest one
//! - **Batch resolution** of dataset items, decoding each distinct
//!   (video, timestamps) group once
//! - **Normalization** to `C × H × W` `f32` tensors in `[0, 1]` via
//!   [`ndarray`]
//! - **Deterministic encoding** of PNG sequences through the `ffmpeg`
//!   executable
//! - **Key frame index** and stream metadata
//!
//! ### Optional Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `rayon` | `resolve_parallel()` decodes independent groups on rayon threads |
//! | `full` | Enables all of the above |
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed to build the crate, and
//! the `ffmpeg` executable must be on `PATH` (or configured through
//! [`EncodeOptions::with_ffmpeg_binary`]) to encode videos.

pub mod assembler;
pub mod configuration;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod keyframe;
pub mod matcher;
pub mod metadata;
pub mod normalize;
#[cfg(feature = "rayon")]
mod rayon;
pub mod reader;
mod utilities;

pub use assembler::{DatasetItem, FrameRef, FrameReference, ItemValue, resolve};
pub use configuration::{DecodeOptions, Device, EncodeOptions};
pub use encode::{encode_video_frames, write_frame_images};
pub use error::{FrameSyncError, ToleranceViolation};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
pub use keyframe::{KeyFrameIndex, KeyFrameInfo};
pub use matcher::{MatchResult, decode_frames_at, match_frames};
pub use metadata::VideoMetadata;
pub use normalize::{FrameTensor, normalize, normalize_frame, stack};
#[cfg(feature = "rayon")]
pub use crate::rayon::resolve_parallel;
pub use reader::{DecodedFrame, FrameSource, VideoStream};
