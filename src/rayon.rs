//! Parallel dataset item resolution.
//!
//! [`resolve_parallel`] plans an item exactly like [`resolve`](crate::resolve)
//! and then decodes the distinct (video, timestamps) groups on rayon worker
//! threads. Each worker opens its own stream, so no decoder state is shared.

use std::path::Path;

use ::rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use crate::assembler::{DatasetItem, apply, plan};
use crate::configuration::DecodeOptions;
use crate::error::FrameSyncError;
use crate::matcher::decode_frames_at;
use crate::normalize::FrameTensor;

/// Like [`resolve`](crate::resolve), with groups decoded in parallel.
///
/// The item is still only modified once every group has succeeded. When
/// several groups fail, which error is returned is unspecified.
pub fn resolve_parallel<K: AsRef<str>>(
    item: &mut DatasetItem,
    keys: &[K],
    videos_dir: &Path,
    options: &DecodeOptions,
) -> Result<(), FrameSyncError> {
    let plan = plan(item, keys, videos_dir)?;
    log::debug!("Decoding {} group(s) on the rayon pool", plan.groups.len());

    let decoded: Result<Vec<Vec<FrameTensor>>, FrameSyncError> = plan
        .groups
        .par_iter()
        .map(|group| decode_frames_at(&group.path, &group.timestamps, options))
        .collect();

    apply(item, plan, decoded?)
}
