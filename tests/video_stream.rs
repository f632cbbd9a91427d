//! Reader and key frame index tests.

mod common;

use framesync::{Device, FrameSource, VideoStream};

#[test]
fn metadata_describes_fixture() {
    let Some(fixture) = common::fixture() else {
        return;
    };

    let stream = VideoStream::open(&fixture.video, Device::Cpu).expect("open");
    let metadata = stream.metadata();
    assert_eq!(metadata.width, common::WIDTH);
    assert_eq!(metadata.height, common::HEIGHT);
    assert!((metadata.frames_per_second - f64::from(common::FPS)).abs() < 0.01);
    assert!((metadata.duration_seconds() - 3.0).abs() < 0.05);
    assert_eq!(metadata.frame_count, u64::from(common::FRAME_COUNT));
    assert!(metadata.start_seconds().abs() < 0.05);
    assert_eq!(stream.start_seconds(), metadata.start_seconds());
    assert_eq!(stream.path(), fixture.video.as_path());
}

#[test]
fn iteration_yields_every_frame_in_order() {
    let Some(fixture) = common::fixture() else {
        return;
    };

    let stream = VideoStream::open(&fixture.video, Device::Cpu).expect("open");
    let timestamps: Vec<f64> = stream
        .map(|frame| frame.expect("decode").timestamp)
        .collect();

    assert_eq!(timestamps.len(), common::FRAME_COUNT as usize);
    assert!(timestamps.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn seek_lands_on_or_before_target() {
    let Some(fixture) = common::fixture() else {
        return;
    };

    let mut stream = VideoStream::open(&fixture.video, Device::Cpu).expect("open");
    stream.seek(2.0).expect("seek");
    let first = stream.next_frame().expect("decode").expect("frame");
    assert!(first.timestamp <= 2.0 + 1e-6);

    // Seeking backwards after reaching the end works too.
    while stream.next_frame().expect("decode").is_some() {}
    stream.seek(0.0).expect("seek");
    let restart = stream.next_frame().expect("decode").expect("frame");
    assert!(restart.timestamp.abs() < 1e-6);
}

#[test]
fn seek_outside_stream_fails() {
    let Some(fixture) = common::fixture() else {
        return;
    };

    let mut stream = VideoStream::open(&fixture.video, Device::Cpu).expect("open");
    assert!(stream.seek(-0.5).is_err());
    assert!(stream.seek(10.0).is_err());
}

#[test]
fn keyframe_scan_covers_all_packets() {
    let Some(fixture) = common::fixture() else {
        return;
    };

    let mut stream = VideoStream::open(&fixture.video, Device::Cpu).expect("open");
    let index = stream.keyframes().expect("keyframes");
    assert!(!index.keyframes.is_empty());
    assert_eq!(index.keyframes[0].packet_number, 0);
    assert_eq!(index.total_video_packets, u64::from(common::FRAME_COUNT));
    assert_eq!(
        index.gop_sizes.iter().sum::<u64>(),
        u64::from(common::FRAME_COUNT)
    );

    // The scan rewinds, so decoding starts from the beginning again.
    let first = stream.next_frame().expect("decode").expect("frame");
    assert!(first.timestamp.abs() < 1e-6);
}
