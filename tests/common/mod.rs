//! Shared fixture for integration tests.
//!
//! The fixture video is generated with the crate's own encoder: 30 flat gray
//! frames at 10 fps (3.0 s), frame `i` filled with level `i * 8`. Tests skip
//! when the `ffmpeg` executable or `libx264` is unavailable, unless
//! `FRAMESYNC_REQUIRE_FFMPEG=1` is set, in which case they fail instead.

#![allow(dead_code)]

use std::{path::PathBuf, sync::Once};

use framesync::{EncodeOptions, encode_video_frames, write_frame_images};
use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;

pub const FPS: u32 = 10;
pub const FRAME_COUNT: u32 = 30;
pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;

/// Set to `1` or `true` to turn a missing encoder into a test failure.
pub const REQUIRE_FFMPEG_VAR: &str = "FRAMESYNC_REQUIRE_FFMPEG";

static SKIP_NOTICE: Once = Once::new();

/// Path stored in dataset items, relative to the dataset root.
pub const STORED_PATH: &str = "videos/episode_000000.mp4";

pub struct Fixture {
    pub dir: TempDir,
    pub video: PathBuf,
}

impl Fixture {
    /// The directory holding the video, i.e. `<root>/videos`.
    pub fn videos_dir(&self) -> PathBuf {
        self.dir.path().join("videos")
    }
}

pub fn level_of(frame_index: u32) -> u8 {
    (frame_index * 8) as u8
}

pub fn frames() -> Vec<DynamicImage> {
    (0..FRAME_COUNT)
        .map(|index| {
            let level = level_of(index);
            DynamicImage::ImageRgb8(RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([level; 3])))
        })
        .collect()
}

/// Encode the fixture video, or `None` if no encoder is available.
pub fn fixture() -> Option<Fixture> {
    let dir = tempfile::tempdir().expect("tempdir");
    let frames_dir = dir.path().join("frames");
    write_frame_images(&frames(), &frames_dir).expect("write frames");

    let video = dir.path().join(STORED_PATH);
    match encode_video_frames(&frames_dir, &video, &EncodeOptions::new(FPS)) {
        Ok(()) => Some(Fixture { dir, video }),
        Err(error) => {
            skip_or_fail(&format!("cannot encode fixture video: {error}"));
            None
        }
    }
}

/// Whether a value of [`REQUIRE_FFMPEG_VAR`] asks for a hard failure.
pub fn encoder_required(value: Option<&str>) -> bool {
    matches!(
        value.map(str::trim).map(str::to_ascii_lowercase).as_deref(),
        Some("1" | "true")
    )
}

/// Panic if an encoder is required, otherwise report the skip once per test
/// binary.
pub fn skip_or_fail(reason: &str) {
    if encoder_required(std::env::var(REQUIRE_FFMPEG_VAR).ok().as_deref()) {
        panic!("{reason} ({REQUIRE_FFMPEG_VAR} is set)");
    }
    SKIP_NOTICE.call_once(|| {
        eprintln!("skipping ffmpeg-backed tests: {reason} (set {REQUIRE_FFMPEG_VAR}=1 to fail)");
    });
}

/// Mean byte value of an RGB24 buffer.
pub fn mean_level(data: &[u8]) -> f64 {
    data.iter().map(|&byte| f64::from(byte)).sum::<f64>() / data.len() as f64
}
