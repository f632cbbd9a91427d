//! Dataset item assembly.
//!
//! A dataset item maps keys to values. Video keys hold either one
//! [`FrameReference`] (a single frame) or an ordered list of them (a frame
//! history, usually built from increasing delta timestamps). [`resolve`]
//! replaces those references with decoded [`FrameTensor`]s, keeping the
//! scalar-vs-sequence shape of every key.
//!
//! Stored paths already start with the videos sub-directory
//! (`videos/episode_000000.mp4`), so they are resolved against the parent of
//! the directory that holds the files.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use framesync::{DatasetItem, DecodeOptions, ItemValue, resolve};
//! use serde_json::json;
//!
//! let mut item = DatasetItem::from_json(
//!     json!({
//!         "observation.image": {"path": "videos/episode_000000.mp4", "timestamp": 0.3},
//!         "action": [0.1, -0.2],
//!     }),
//!     &["observation.image"],
//! )?;
//! resolve(&mut item, &["observation.image"], Path::new("data/videos"), &DecodeOptions::new(1e-4))?;
//! assert!(matches!(item.get("observation.image"), Some(ItemValue::Frame(_))));
//! # Ok::<(), framesync::FrameSyncError>(())
//! ```

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::configuration::DecodeOptions;
use crate::error::FrameSyncError;
use crate::matcher::decode_frames_at;
use crate::normalize::FrameTensor;

/// One stored video frame reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReference {
    /// Video path relative to the dataset root, e.g. `videos/episode_0.mp4`.
    pub path: String,
    /// Requested presentation timestamp in seconds.
    pub timestamp: f64,
}

/// The reference held by a video key: one frame or an ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FrameRef {
    /// A single frame; resolves to [`ItemValue::Frame`].
    Scalar(FrameReference),
    /// Several frames, expected in ascending timestamp order; resolves to
    /// [`ItemValue::Frames`] of the same length.
    Sequence(Vec<FrameReference>),
}

impl FrameRef {
    fn references(&self) -> &[FrameReference] {
        match self {
            FrameRef::Scalar(reference) => std::slice::from_ref(reference),
            FrameRef::Sequence(references) => references,
        }
    }

    /// Requested timestamps in stored order.
    pub fn timestamps(&self) -> Vec<f64> {
        self.references()
            .iter()
            .map(|reference| reference.timestamp)
            .collect()
    }
}

/// A value inside a [`DatasetItem`].
#[derive(Debug, Clone, PartialEq)]
pub enum ItemValue {
    /// Unresolved video frame reference(s).
    Reference(FrameRef),
    /// A resolved single frame.
    Frame(FrameTensor),
    /// Resolved frames of a sequence reference, in stored order.
    Frames(Vec<FrameTensor>),
    /// Any non-video value, passed through untouched.
    Other(serde_json::Value),
}

/// A dataset sample: key → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetItem {
    fields: BTreeMap<String, ItemValue>,
}

impl DatasetItem {
    /// Create an empty item.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an item from a JSON object. Keys listed in `video_keys` must
    /// hold a frame reference (an object with `path` and `timestamp`, or an
    /// array of such objects); all other keys become [`ItemValue::Other`].
    ///
    /// # Errors
    ///
    /// [`FrameSyncError::InvalidItem`] if `value` is not an object or a video
    /// key does not hold a frame reference.
    pub fn from_json<K: AsRef<str>>(
        value: serde_json::Value,
        video_keys: &[K],
    ) -> Result<Self, FrameSyncError> {
        let serde_json::Value::Object(object) = value else {
            return Err(FrameSyncError::InvalidItem {
                key: String::new(),
                reason: "dataset item must be a JSON object".to_string(),
            });
        };

        let mut item = Self::new();
        for (key, value) in object {
            let is_video = video_keys.iter().any(|video_key| video_key.as_ref() == key);
            let value = if is_video {
                let reference = FrameRef::deserialize(value).map_err(|error| {
                    FrameSyncError::InvalidItem {
                        key: key.clone(),
                        reason: format!("not a video frame reference: {error}"),
                    }
                })?;
                ItemValue::Reference(reference)
            } else {
                ItemValue::Other(value)
            };
            item.fields.insert(key, value);
        }
        Ok(item)
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: ItemValue) -> Option<ItemValue> {
        self.fields.insert(key.into(), value)
    }

    /// Borrow a value.
    pub fn get(&self, key: &str) -> Option<&ItemValue> {
        self.fields.get(key)
    }

    /// Remove and return a value.
    pub fn remove(&mut self, key: &str) -> Option<ItemValue> {
        self.fields.remove(key)
    }

    /// Iterate over keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// `true` if the item has no keys.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Whether a key resolves to one tensor or a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cardinality {
    Scalar,
    Sequence,
}

#[derive(Debug)]
struct KeyPlan {
    key: String,
    cardinality: Cardinality,
    /// `None` for an empty sequence, which needs no decoding.
    group: Option<usize>,
}

/// One decode job: a video and the timestamps requested from it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FrameGroup {
    pub(crate) path: PathBuf,
    pub(crate) timestamps: Vec<f64>,
}

#[derive(Debug)]
pub(crate) struct ResolvePlan {
    keys: Vec<KeyPlan>,
    pub(crate) groups: Vec<FrameGroup>,
}

/// Directory that stored paths are relative to.
fn dataset_root(videos_dir: &Path) -> &Path {
    videos_dir.parent().unwrap_or(videos_dir)
}

/// Validate every key and collect the distinct decode groups, without
/// decoding anything.
pub(crate) fn plan<K: AsRef<str>>(
    item: &DatasetItem,
    keys: &[K],
    videos_dir: &Path,
) -> Result<ResolvePlan, FrameSyncError> {
    let root = dataset_root(videos_dir);
    let mut key_plans = Vec::with_capacity(keys.len());
    let mut groups: Vec<FrameGroup> = Vec::new();

    for key in keys {
        let key = key.as_ref();
        let reference = match item.get(key) {
            Some(ItemValue::Reference(reference)) => reference,
            Some(_) => {
                return Err(FrameSyncError::InvalidItem {
                    key: key.to_string(),
                    reason: "value is not an unresolved video frame reference".to_string(),
                });
            }
            None => {
                return Err(FrameSyncError::InvalidItem {
                    key: key.to_string(),
                    reason: "key is missing".to_string(),
                });
            }
        };

        let cardinality = match reference {
            FrameRef::Scalar(_) => Cardinality::Scalar,
            FrameRef::Sequence(_) => Cardinality::Sequence,
        };

        let mut paths: Vec<PathBuf> = Vec::new();
        for stored in reference.references() {
            let resolved = root.join(&stored.path);
            if !paths.contains(&resolved) {
                paths.push(resolved);
            }
        }
        if paths.len() > 1 {
            return Err(FrameSyncError::UnsupportedBatch {
                key: key.to_string(),
                paths,
            });
        }

        let group = paths.pop().map(|path| {
            let candidate = FrameGroup {
                path,
                timestamps: reference.timestamps(),
            };
            match groups.iter().position(|existing| *existing == candidate) {
                Some(index) => index,
                None => {
                    groups.push(candidate);
                    groups.len() - 1
                }
            }
        });

        key_plans.push(KeyPlan {
            key: key.to_string(),
            cardinality,
            group,
        });
    }

    log::debug!(
        "Planned {} video key(s) into {} decode group(s)",
        key_plans.len(),
        groups.len()
    );

    Ok(ResolvePlan {
        keys: key_plans,
        groups,
    })
}

/// Write decoded groups back into `item`. `decoded[i]` holds the tensors of
/// `plan.groups[i]`.
pub(crate) fn apply(
    item: &mut DatasetItem,
    plan: ResolvePlan,
    decoded: Vec<Vec<FrameTensor>>,
) -> Result<(), FrameSyncError> {
    let mut remaining_uses = vec![0usize; decoded.len()];
    for key_plan in &plan.keys {
        if let Some(group) = key_plan.group {
            remaining_uses[group] += 1;
        }
    }
    let mut decoded: Vec<Option<Vec<FrameTensor>>> = decoded.into_iter().map(Some).collect();

    let mut resolved = Vec::with_capacity(plan.keys.len());
    for key_plan in plan.keys {
        let tensors = match key_plan.group {
            Some(group) => {
                remaining_uses[group] -= 1;
                let tensors = if remaining_uses[group] == 0 {
                    decoded[group].take()
                } else {
                    decoded[group].clone()
                };
                tensors.ok_or_else(|| FrameSyncError::InvalidItem {
                    key: key_plan.key.clone(),
                    reason: "decoded frames missing for key".to_string(),
                })?
            }
            None => Vec::new(),
        };

        let value = match key_plan.cardinality {
            Cardinality::Scalar => {
                let tensor = tensors.into_iter().next().ok_or_else(|| {
                    FrameSyncError::InvalidItem {
                        key: key_plan.key.clone(),
                        reason: "no frame decoded for single reference".to_string(),
                    }
                })?;
                ItemValue::Frame(tensor)
            }
            Cardinality::Sequence => ItemValue::Frames(tensors),
        };
        resolved.push((key_plan.key, value));
    }

    for (key, value) in resolved {
        item.insert(key, value);
    }
    Ok(())
}

/// Replace the references under `keys` with decoded, normalized frames.
///
/// Every key is validated before anything is decoded, each distinct
/// (video, timestamps) pair is decoded once, and `item` is only modified
/// once every decode has succeeded.
///
/// # Errors
///
/// - [`FrameSyncError::InvalidItem`] if a key is missing or already
///   resolved.
/// - [`FrameSyncError::UnsupportedBatch`] if one key's references span
///   several videos.
/// - Everything [`decode_frames_at`] returns.
pub fn resolve<K: AsRef<str>>(
    item: &mut DatasetItem,
    keys: &[K],
    videos_dir: &Path,
    options: &DecodeOptions,
) -> Result<(), FrameSyncError> {
    let plan = plan(item, keys, videos_dir)?;
    let decoded = plan
        .groups
        .iter()
        .map(|group| decode_frames_at(&group.path, &group.timestamps, options))
        .collect::<Result<Vec<_>, _>>()?;
    apply(item, plan, decoded)
}
