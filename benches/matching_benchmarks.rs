//! Benchmarks for matching, normalization, and decoding.
//!
//! Run with: cargo bench
//!
//! The decode benchmarks read the video named by `FRAMESYNC_BENCH_VIDEO`
//! and are skipped when it is unset.

use std::{hint::black_box, path::PathBuf};

use criterion::Criterion;
use ffmpeg_next::util::log::Level as LogLevel;
use framesync::{
    DecodeOptions, DecodedFrame, Device, FrameSource, FrameSyncError, VideoStream,
    decode_frames_at, match_frames, normalize, stack,
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;

/// In-memory 30 fps source with a key frame every 30 frames.
struct SyntheticSource {
    frame_count: usize,
    cursor: usize,
    pixels: Vec<u8>,
}

impl SyntheticSource {
    fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            cursor: 0,
            pixels: vec![128; (WIDTH * HEIGHT) as usize * DecodedFrame::CHANNELS],
        }
    }
}

impl FrameSource for SyntheticSource {
    fn duration_seconds(&self) -> f64 {
        self.frame_count as f64 / 30.0
    }

    fn seek(&mut self, timestamp: f64) -> Result<(), FrameSyncError> {
        let index = ((timestamp * 30.0).floor() as usize).min(self.frame_count);
        self.cursor = index - index % 30;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameSyncError> {
        if self.cursor >= self.frame_count {
            return Ok(None);
        }
        let index = self.cursor;
        self.cursor += 1;
        Ok(Some(DecodedFrame {
            timestamp: index as f64 / 30.0,
            pts: index as i64,
            width: WIDTH,
            height: HEIGHT,
            data: self.pixels.clone(),
        }))
    }
}

fn bench_video() -> Option<PathBuf> {
    std::env::var_os("FRAMESYNC_BENCH_VIDEO").map(PathBuf::from)
}

fn benchmark_matching(criterion: &mut Criterion) {
    let options = DecodeOptions::new(1e-3);
    let history: Vec<f64> = (0..8).map(|step| 2.0 + f64::from(step) / 30.0).collect();

    criterion.bench_function("match 8-frame history (synthetic)", |bencher| {
        bencher.iter(|| {
            let mut source = SyntheticSource::new(300);
            let matches = match_frames(&mut source, black_box(&history), &options).unwrap();
            black_box(matches);
        });
    });
}

fn benchmark_normalization(criterion: &mut Criterion) {
    let buffer = vec![200u8; (WIDTH * HEIGHT) as usize * 3];

    criterion.bench_function("normalize 640x480 RGB", |bencher| {
        bencher.iter(|| {
            black_box(normalize(black_box(&buffer), HEIGHT as usize, WIDTH as usize, 3).unwrap());
        });
    });

    let frames: Vec<_> = (0..8)
        .map(|_| normalize(&buffer, HEIGHT as usize, WIDTH as usize, 3).unwrap())
        .collect();
    criterion.bench_function("stack 8 frames", |bencher| {
        bencher.iter(|| black_box(stack(black_box(&frames)).unwrap()));
    });
}

fn benchmark_decoding(criterion: &mut Criterion) {
    ffmpeg_next::util::log::set_level(LogLevel::Error);

    let Some(video) = bench_video() else {
        eprintln!("Skipping decode benchmarks: FRAMESYNC_BENCH_VIDEO not set");
        return;
    };

    let options = DecodeOptions::new(0.02);
    criterion.bench_function("decode single frame (mid-video seek)", |bencher| {
        bencher.iter(|| black_box(decode_frames_at(&video, &[1.0], &options).unwrap()));
    });

    criterion.bench_function("decode 5-frame window", |bencher| {
        bencher.iter(|| {
            let mut stream = VideoStream::open(&video, Device::Cpu).unwrap();
            black_box(match_frames(&mut stream, &[1.0, 1.1, 1.2, 1.3, 1.4], &options).unwrap());
        });
    });
}

criterion::criterion_group!(
    benches,
    benchmark_matching,
    benchmark_normalization,
    benchmark_decoding,
);
criterion::criterion_main!(benches);
