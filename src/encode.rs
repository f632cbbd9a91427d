//! Encoding image sequences into videos.
//!
//! [`encode_video_frames`] runs the `ffmpeg` executable over a directory of
//! `frame_000000.png`, `frame_000001.png`, ... images and writes a constant
//! frame rate video. The argument template is fixed (see [`EncodeOptions`])
//! so that re-encoding the same images yields the same decoded pixels.
//! [`write_frame_images`] produces such a directory from in-memory images.
//!
//! # Example
//!
//! ```no_run
//! use framesync::{EncodeOptions, encode_video_frames};
//!
//! encode_video_frames("frames/episode_0", "videos/episode_000000.mp4", &EncodeOptions::new(10))?;
//! # Ok::<(), framesync::FrameSyncError>(())
//! ```

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};

use image::DynamicImage;

use crate::configuration::{EncodeOptions, FRAME_FILE_PATTERN, FRAME_START_NUMBER};
use crate::error::FrameSyncError;

/// Arguments passed to the encoder, without the executable itself.
pub(crate) fn encoder_arguments(
    frames_dir: &Path,
    output_path: &Path,
    options: &EncodeOptions,
) -> Vec<OsString> {
    let mut arguments: Vec<OsString> = [
        "-r".to_string(),
        options.fps.to_string(),
        "-f".to_string(),
        "image2".to_string(),
        "-loglevel".to_string(),
        options.log_level.as_cli_arg().to_string(),
        "-start_number".to_string(),
        FRAME_START_NUMBER.to_string(),
        "-i".to_string(),
    ]
    .into_iter()
    .map(OsString::from)
    .collect();

    arguments.push(frames_dir.join(FRAME_FILE_PATTERN).into_os_string());
    arguments.push("-vcodec".into());
    arguments.push(options.video_codec.clone().into());
    arguments.push("-pix_fmt".into());
    arguments.push(options.pixel_format.clone().into());
    arguments.push(if options.overwrite { "-y" } else { "-n" }.into());
    arguments.push(output_path.as_os_str().to_os_string());
    arguments
}

/// Encode the image sequence in `frames_dir` into `output_path`.
///
/// Parent directories of `output_path` are created first. The call blocks
/// until the encoder exits.
///
/// # Errors
///
/// - [`FrameSyncError::InvalidConfiguration`] if `options` are invalid
///   (e.g. `fps == 0`).
/// - [`FrameSyncError::Io`] if the output directory cannot be created.
/// - [`FrameSyncError::Encoding`] if the encoder cannot be launched or
///   exits with a nonzero status. Its stderr is carried in the error.
pub fn encode_video_frames<P: AsRef<Path>, Q: AsRef<Path>>(
    frames_dir: P,
    output_path: Q,
    options: &EncodeOptions,
) -> Result<(), FrameSyncError> {
    options.validate()?;
    let frames_dir = frames_dir.as_ref();
    let output_path = output_path.as_ref();

    if let Some(parent) = output_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let arguments = encoder_arguments(frames_dir, output_path, options);
    log::info!(
        "Encoding {} at {} fps into {}",
        frames_dir.display(),
        options.fps,
        output_path.display()
    );
    log::debug!("{} {:?}", options.ffmpeg_binary.display(), arguments);

    let output = Command::new(&options.ffmpeg_binary)
        .args(&arguments)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| FrameSyncError::Encoding {
            exit_code: None,
            stderr: format!(
                "failed to launch {}: {error}",
                options.ffmpeg_binary.display()
            ),
        })?;

    if !output.status.success() {
        return Err(FrameSyncError::Encoding {
            exit_code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    log::debug!("Encoded {}", output_path.display());
    Ok(())
}

/// Save `frames` as `frame_000000.png`, `frame_000001.png`, ... in `dir`,
/// creating it if needed. Returns the written paths in order.
pub fn write_frame_images<P: AsRef<Path>>(
    frames: &[DynamicImage],
    dir: P,
) -> Result<Vec<PathBuf>, FrameSyncError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut paths = Vec::with_capacity(frames.len());
    for (offset, frame) in frames.iter().enumerate() {
        let index = offset + FRAME_START_NUMBER as usize;
        let path = dir.join(format!("frame_{index:06}.png"));
        frame.save(&path)?;
        paths.push(path);
    }
    log::debug!("Wrote {} frame images to {}", paths.len(), dir.display());
    Ok(paths)
}
