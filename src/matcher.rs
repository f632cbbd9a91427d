//! Nearest-timestamp frame matching.
//!
//! Inter-frame compression stores a key frame followed by frames that only
//! hold differences from it, so a frame can only be decoded by starting at
//! the preceding key frame and walking forward. [`match_frames`] therefore
//! seeks once to the earliest requested timestamp, decodes forward until it
//! has passed the latest one, and then picks the closest loaded frame for
//! every request.
//!
//! A request whose closest frame is not strictly within the tolerance fails
//! the whole call with [`FrameSyncError::ToleranceExceeded`]: substituting a
//! far-away frame would silently desynchronize the data.
//!
//! # Example
//!
//! ```no_run
//! use framesync::{DecodeOptions, decode_frames_at};
//!
//! let options = DecodeOptions::new(1e-4);
//! let frames = decode_frames_at("videos/episode_000000.mp4", &[0.0, 0.1, 0.2], &options)?;
//! assert_eq!(frames.len(), 3);
//! # Ok::<(), framesync::FrameSyncError>(())
//! ```

use std::path::Path;

use crate::configuration::DecodeOptions;
use crate::error::{FrameSyncError, ToleranceViolation};
use crate::normalize::{FrameTensor, normalize_frame};
use crate::reader::{DecodedFrame, FrameSource, VideoStream, check_stream_bounds};

/// The frame chosen for one requested timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// The requested timestamp in seconds.
    pub requested: f64,
    /// Presentation timestamp of the chosen frame.
    pub matched: f64,
    /// `|requested - matched|`, always below the tolerance.
    pub distance: f64,
    /// The chosen frame.
    pub frame: DecodedFrame,
}

/// Index and L1 distance of the loaded timestamp closest to `requested`.
///
/// Ties go to the earliest loaded frame.
pub(crate) fn nearest_loaded(requested: f64, loaded: &[f64]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, &timestamp) in loaded.iter().enumerate() {
        let distance = (requested - timestamp).abs();
        if best.is_none_or(|(_, best_distance)| distance < best_distance) {
            best = Some((index, distance));
        }
    }
    best
}

/// Decode the window covering `requested` from `source` and return the
/// closest frame for every request, in request order.
///
/// Requests are expected in ascending order, but the window is computed
/// from the minimum and maximum so any order gives the same matches. An
/// empty `requested` slice returns an empty vector without touching the
/// source.
///
/// # Errors
///
/// - [`FrameSyncError::InvalidConfiguration`] if the tolerance is not a
///   positive finite number.
/// - [`FrameSyncError::Seek`] if any requested timestamp is non-finite or
///   outside the stream. When the stream duration is unknown, a window
///   that yields no frame at all is reported the same way.
/// - [`FrameSyncError::ToleranceExceeded`] listing exactly the requests
///   whose closest frame is not within the tolerance.
/// - Any decode error from the source.
pub fn match_frames<S>(
    source: &mut S,
    requested: &[f64],
    options: &DecodeOptions,
) -> Result<Vec<MatchResult>, FrameSyncError>
where
    S: FrameSource + ?Sized,
{
    if requested.is_empty() {
        return Ok(Vec::new());
    }
    options.validate()?;

    let start = source.start_seconds();
    let duration = source.duration_seconds();
    if let Some(&invalid) = requested.iter().find(|timestamp| !timestamp.is_finite()) {
        return Err(FrameSyncError::Seek {
            timestamp: invalid,
            start,
            duration,
        });
    }

    let window_start = requested.iter().copied().fold(f64::INFINITY, f64::min);
    let window_end = requested.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    check_stream_bounds(window_start, start, duration)?;
    check_stream_bounds(window_end, start, duration)?;

    if !requested.is_sorted() {
        log::debug!("Requested timestamps are not ascending; scanning {window_start:.4}s..={window_end:.4}s");
    }

    source.seek(window_start)?;

    // Frames decoded in this window; dropped when the call returns.
    let mut loaded: Vec<DecodedFrame> = Vec::new();
    while let Some(frame) = source.next_frame()? {
        if options.log_loaded_timestamps {
            log::info!("frame loaded at timestamp={:.4}", frame.timestamp);
        }
        let reached_end = frame.timestamp >= window_end;
        loaded.push(frame);
        if reached_end {
            break;
        }
    }

    // Without a known duration the bounds check cannot catch a window past
    // the end; an empty scan is the only evidence of it.
    if loaded.is_empty() && duration <= 0.0 {
        return Err(FrameSyncError::Seek {
            timestamp: window_start,
            start,
            duration,
        });
    }

    let loaded_timestamps: Vec<f64> = loaded.iter().map(|frame| frame.timestamp).collect();
    let tolerance = options.tolerance_s;

    let mut chosen: Vec<(f64, usize, f64)> = Vec::with_capacity(requested.len());
    let mut violations = Vec::new();
    for &timestamp in requested {
        match nearest_loaded(timestamp, &loaded_timestamps) {
            Some((index, distance)) if distance < tolerance => {
                chosen.push((timestamp, index, distance));
            }
            Some((index, distance)) => violations.push(ToleranceViolation {
                requested: timestamp,
                nearest: Some(loaded_timestamps[index]),
                distance,
            }),
            None => violations.push(ToleranceViolation {
                requested: timestamp,
                nearest: None,
                distance: f64::INFINITY,
            }),
        }
    }

    if !violations.is_empty() {
        log::debug!(
            "{} of {} requested timestamps exceed tolerance {tolerance}s ({} frames loaded)",
            violations.len(),
            requested.len(),
            loaded.len(),
        );
        return Err(FrameSyncError::ToleranceExceeded {
            violations,
            tolerance,
        });
    }

    if options.log_loaded_timestamps {
        let closest: Vec<String> = chosen
            .iter()
            .map(|&(_, index, _)| format!("{:.4}", loaded_timestamps[index]))
            .collect();
        log::info!("closest timestamps=[{}]", closest.join(", "));
    }

    // Move each frame out on its last use, clone it for earlier ones.
    let mut remaining_uses = vec![0usize; loaded.len()];
    for &(_, index, _) in &chosen {
        remaining_uses[index] += 1;
    }
    let mut frames: Vec<Option<DecodedFrame>> = loaded.into_iter().map(Some).collect();

    let mut results = Vec::with_capacity(chosen.len());
    for (requested, index, distance) in chosen {
        remaining_uses[index] -= 1;
        let frame = if remaining_uses[index] == 0 {
            frames[index].take()
        } else {
            frames[index].clone()
        };
        let frame = frame.ok_or_else(|| {
            FrameSyncError::VideoDecode(format!("frame {index} was consumed twice"))
        })?;
        results.push(MatchResult {
            requested,
            matched: frame.timestamp,
            distance,
            frame,
        });
    }

    Ok(results)
}

/// Open the video at `path`, match `requested`, and normalize the chosen
/// frames to channel-first tensors, in request order.
///
/// The stream is closed before this function returns, on success and on
/// every error path.
///
/// # Errors
///
/// Everything [`VideoStream::open`] and [`match_frames`] return, plus
/// [`FrameSyncError::Format`] for malformed decoded buffers.
pub fn decode_frames_at<P: AsRef<Path>>(
    path: P,
    requested: &[f64],
    options: &DecodeOptions,
) -> Result<Vec<FrameTensor>, FrameSyncError> {
    options.validate()?;
    let mut stream = VideoStream::open(path, options.device)?;
    let matches = match_frames(&mut stream, requested, options)?;
    matches
        .iter()
        .map(|result| normalize_frame(&result.frame))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Constant-rate source whose key frames repeat every `gop` frames.
    /// Each frame's single pixel holds its index.
    struct SyntheticSource {
        timestamps: Vec<f64>,
        gop: usize,
        start: f64,
        duration: f64,
        cursor: usize,
        seeks: Vec<f64>,
        pulled: Vec<f64>,
    }

    impl SyntheticSource {
        fn constant_rate(frame_count: usize, fps: f64, gop: usize) -> Self {
            let timestamps = (0..frame_count).map(|index| index as f64 / fps).collect();
            Self::with_timestamps(timestamps, frame_count as f64 / fps, gop)
        }

        fn with_timestamps(timestamps: Vec<f64>, duration: f64, gop: usize) -> Self {
            Self {
                timestamps,
                gop,
                start: 0.0,
                duration,
                cursor: 0,
                seeks: Vec::new(),
                pulled: Vec::new(),
            }
        }

        /// Shift every frame so the stream starts at `start` seconds.
        fn starting_at(mut self, start: f64) -> Self {
            for timestamp in &mut self.timestamps {
                *timestamp += start;
            }
            self.start = start;
            self
        }
    }

    impl FrameSource for SyntheticSource {
        fn duration_seconds(&self) -> f64 {
            self.duration
        }

        fn start_seconds(&self) -> f64 {
            self.start
        }

        fn seek(&mut self, timestamp: f64) -> Result<(), FrameSyncError> {
            check_stream_bounds(timestamp, self.start, self.duration)?;
            self.seeks.push(timestamp);
            let at_or_before = self
                .timestamps
                .iter()
                .rposition(|&frame| frame <= timestamp)
                .unwrap_or(0);
            self.cursor = at_or_before - at_or_before % self.gop;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Option<DecodedFrame>, FrameSyncError> {
            let Some(&timestamp) = self.timestamps.get(self.cursor) else {
                return Ok(None);
            };
            let frame = DecodedFrame {
                timestamp,
                pts: self.cursor as i64,
                width: 1,
                height: 1,
                data: vec![self.cursor as u8; 3],
            };
            self.cursor += 1;
            self.pulled.push(timestamp);
            Ok(Some(frame))
        }
    }

    #[test]
    fn nearest_prefers_earliest_on_ties() {
        assert_eq!(nearest_loaded(0.125, &[0.0, 0.25, 0.5]), Some((0, 0.125)));
        assert_eq!(nearest_loaded(0.3, &[0.0, 0.25, 0.5]).map(|(index, _)| index), Some(1));
        assert_eq!(nearest_loaded(1.0, &[]), None);
    }

    #[test]
    fn exact_timestamps_match_with_zero_distance() {
        let mut source = SyntheticSource::constant_rate(30, 10.0, 10);
        let requested = [0.0, 0.3, 1.2];
        let results = match_frames(&mut source, &requested, &DecodeOptions::new(1e-4)).unwrap();

        assert_eq!(results.len(), 3);
        for (result, &timestamp) in results.iter().zip(&requested) {
            assert_eq!(result.distance, 0.0);
            assert_eq!(result.matched, timestamp);
        }
    }

    #[test]
    fn midpoint_requests_stay_within_half_a_frame() {
        let mut source = SyntheticSource::constant_rate(30, 10.0, 10);
        let requested = [0.05, 1.55, 2.85];
        let results = match_frames(&mut source, &requested, &DecodeOptions::new(0.06)).unwrap();

        assert_eq!(results.len(), 3);
        for result in &results {
            assert!(result.distance <= 0.05 + 1e-9, "{result:?}");
        }
    }

    #[test]
    fn ties_resolve_to_the_earlier_frame() {
        let mut source = SyntheticSource::constant_rate(8, 4.0, 4);
        let results = match_frames(&mut source, &[0.125], &DecodeOptions::new(0.2)).unwrap();
        assert_eq!(results[0].matched, 0.0);
        assert_eq!(results[0].frame.data, vec![0, 0, 0]);
    }

    #[test]
    fn scan_starts_at_key_frame_and_stops_after_last_request() {
        let mut source = SyntheticSource::constant_rate(30, 10.0, 5);
        match_frames(&mut source, &[0.7, 1.0], &DecodeOptions::new(0.01)).unwrap();

        assert_eq!(source.seeks, vec![0.7]);
        // Key frame at or before 0.7 is frame 5 (0.5s); the scan ends on 1.0s.
        assert_eq!(source.pulled.first().copied(), Some(0.5));
        assert_eq!(source.pulled.last().copied(), Some(1.0));
        assert_eq!(source.pulled.len(), 6);
    }

    #[test]
    fn violations_list_exactly_the_failing_requests() {
        let timestamps = vec![0.0, 0.1, 0.2, 0.6, 0.7, 0.8];
        let mut source = SyntheticSource::with_timestamps(timestamps, 0.9, 3);
        let error = match_frames(&mut source, &[0.1, 0.45, 0.7], &DecodeOptions::new(0.06))
            .unwrap_err();

        match error {
            FrameSyncError::ToleranceExceeded {
                violations,
                tolerance,
            } => {
                assert_eq!(tolerance, 0.06);
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].requested, 0.45);
                assert_eq!(violations[0].nearest, Some(0.6));
                assert!((violations[0].distance - 0.15).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_request_is_a_no_op() {
        let mut source = SyntheticSource::constant_rate(10, 10.0, 5);
        let results = match_frames(&mut source, &[], &DecodeOptions::new(0.05)).unwrap();
        assert!(results.is_empty());
        assert!(source.seeks.is_empty());
        assert!(source.pulled.is_empty());
    }

    #[test]
    fn single_request_scans_one_pass() {
        let mut source = SyntheticSource::constant_rate(30, 10.0, 10);
        let results = match_frames(&mut source, &[1.5], &DecodeOptions::new(0.01)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(source.pulled.len(), 6);
        assert_eq!(source.pulled.last().copied(), Some(1.5));
    }

    #[test]
    fn out_of_bounds_requests_fail_before_seeking() {
        let mut source = SyntheticSource::constant_rate(30, 10.0, 10);
        let error = match_frames(&mut source, &[1.0, 3.5], &DecodeOptions::new(0.05)).unwrap_err();
        assert!(matches!(error, FrameSyncError::Seek { timestamp, .. } if timestamp == 3.5));
        assert!(source.seeks.is_empty());

        let error = match_frames(&mut source, &[f64::NAN], &DecodeOptions::new(0.05)).unwrap_err();
        assert!(matches!(error, FrameSyncError::Seek { .. }));
    }

    #[test]
    fn unsorted_requests_keep_request_order() {
        let mut source = SyntheticSource::constant_rate(30, 10.0, 10);
        let results =
            match_frames(&mut source, &[2.0, 0.5, 1.0], &DecodeOptions::new(0.01)).unwrap();
        let matched: Vec<f64> = results.iter().map(|result| result.matched).collect();
        assert_eq!(matched, vec![2.0, 0.5, 1.0]);
        assert_eq!(source.seeks, vec![0.5]);
    }

    #[test]
    fn repeated_requests_share_a_frame() {
        let mut source = SyntheticSource::constant_rate(10, 10.0, 5);
        let results =
            match_frames(&mut source, &[0.3, 0.3, 0.31], &DecodeOptions::new(0.02)).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|result| result.frame.data == vec![3, 3, 3]));
    }

    #[test]
    fn no_loaded_frames_reports_every_request() {
        let mut source = SyntheticSource::with_timestamps(Vec::new(), 1.0, 1);
        let error = match_frames(&mut source, &[0.2, 0.4], &DecodeOptions::new(0.05)).unwrap_err();
        match error {
            FrameSyncError::ToleranceExceeded { violations, .. } => {
                assert_eq!(violations.len(), 2);
                assert!(violations.iter().all(|violation| violation.nearest.is_none()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bounds_follow_stream_start_offset() {
        // 30 frames at 10 fps whose first frame is at 1.0s.
        let mut source = SyntheticSource::constant_rate(30, 10.0, 10).starting_at(1.0);
        let results =
            match_frames(&mut source, &[3.5, 3.9], &DecodeOptions::new(1e-6)).unwrap();
        let matched: Vec<f64> = results.iter().map(|result| result.matched).collect();
        assert_eq!(matched.len(), 2);
        assert!((matched[0] - 3.5).abs() < 1e-9);
        assert!((matched[1] - 3.9).abs() < 1e-9);

        let error = match_frames(&mut source, &[0.5, 1.5], &DecodeOptions::new(0.05)).unwrap_err();
        assert!(matches!(
            error,
            FrameSyncError::Seek { timestamp, start, .. } if timestamp == 0.5 && start == 1.0
        ));
    }

    #[test]
    fn empty_scan_with_unknown_duration_is_a_seek_error() {
        let mut source = SyntheticSource::with_timestamps(Vec::new(), 0.0, 1);
        let error = match_frames(&mut source, &[2.0, 2.5], &DecodeOptions::new(0.05)).unwrap_err();
        assert!(matches!(
            error,
            FrameSyncError::Seek { timestamp, duration, .. } if timestamp == 2.0 && duration == 0.0
        ));
        assert_eq!(source.seeks, vec![2.0]);
    }

    #[test]
    fn diagnostic_logging_does_not_change_results() {
        let quiet = DecodeOptions::new(0.06);
        let verbose = DecodeOptions::new(0.06).with_log_loaded_timestamps(true);
        let requested = [0.05, 1.55, 2.85];

        let mut plain_source = SyntheticSource::constant_rate(30, 10.0, 10);
        let mut logged_source = SyntheticSource::constant_rate(30, 10.0, 10);
        let plain = match_frames(&mut plain_source, &requested, &quiet).unwrap();
        let logged = match_frames(&mut logged_source, &requested, &verbose).unwrap();
        assert_eq!(plain, logged);
        assert_eq!(plain_source.seeks, logged_source.seeks);
        assert_eq!(plain_source.pulled, logged_source.pulled);

        let timestamps = vec![0.0, 0.1, 0.2, 0.6, 0.7, 0.8];
        let mut plain_source = SyntheticSource::with_timestamps(timestamps.clone(), 0.9, 3);
        let mut logged_source = SyntheticSource::with_timestamps(timestamps, 0.9, 3);
        let gapped = [0.1, 0.45, 0.7];
        let plain_error = match_frames(&mut plain_source, &gapped, &quiet).unwrap_err();
        let logged_error = match_frames(&mut logged_source, &gapped, &verbose).unwrap_err();
        match (plain_error, logged_error) {
            (
                FrameSyncError::ToleranceExceeded {
                    violations: plain_violations,
                    tolerance: plain_tolerance,
                },
                FrameSyncError::ToleranceExceeded {
                    violations: logged_violations,
                    tolerance: logged_tolerance,
                },
            ) => {
                assert_eq!(plain_violations, logged_violations);
                assert_eq!(plain_tolerance, logged_tolerance);
            }
            other => panic!("unexpected errors: {other:?}"),
        }
        assert_eq!(plain_source.pulled, logged_source.pulled);
    }

    #[test]
    fn invalid_tolerance_is_rejected() {
        let mut source = SyntheticSource::constant_rate(10, 10.0, 5);
        for tolerance in [0.0, -1.0, f64::NAN] {
            let error =
                match_frames(&mut source, &[0.1], &DecodeOptions::new(tolerance)).unwrap_err();
            assert!(matches!(error, FrameSyncError::InvalidConfiguration(_)));
        }
    }
}
