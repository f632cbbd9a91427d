//! Conversion of decoded pixels to normalized tensors.
//!
//! Decoders hand out interleaved 8-bit pixels (`height × width × channels`).
//! Models consume channel-first `f32` values in `[0, 1]`. [`normalize`]
//! performs that conversion, [`FrameTensor::to_bytes`] undoes it.
//!
//! # Example
//!
//! ```
//! use framesync::normalize;
//!
//! // A 1×2 RGB image: one red pixel, one white pixel.
//! let tensor = normalize(&[255, 0, 0, 255, 255, 255], 1, 2, 3)?;
//! assert_eq!(tensor.shape(), (3, 1, 2));
//! assert_eq!(tensor.as_array()[[0, 0, 0]], 1.0);
//! assert_eq!(tensor.as_array()[[1, 0, 0]], 0.0);
//! assert_eq!(tensor.to_bytes(), vec![255, 0, 0, 255, 255, 255]);
//! # Ok::<(), framesync::FrameSyncError>(())
//! ```

use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use ndarray::{Array3, Array4, ArrayView3, Axis};

use crate::error::FrameSyncError;
use crate::reader::DecodedFrame;

/// A channel-first (`C × H × W`) `f32` frame with values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTensor {
    data: Array3<f32>,
}

impl FrameTensor {
    /// Wrap an existing channel-first array.
    pub fn from_array(data: Array3<f32>) -> Self {
        Self { data }
    }

    /// Normalize any image, converting it to RGB first.
    pub fn from_image(image: &DynamicImage) -> Result<Self, FrameSyncError> {
        let rgb = image.to_rgb8();
        normalize(
            rgb.as_raw(),
            rgb.height() as usize,
            rgb.width() as usize,
            3,
        )
    }

    /// `(channels, height, width)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Borrow the underlying array.
    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    /// Take the underlying array.
    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    /// Inverse of [`normalize`]: scale by 255, round, clamp, and
    /// re-interleave to `H × W × C` bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data
            .view()
            .permuted_axes([1, 2, 0])
            .iter()
            .map(|&value| (value * 255.0).round().clamp(0.0, 255.0) as u8)
            .collect()
    }

    /// Convert back to an image. Supports 1 (gray), 3 (RGB) and 4 (RGBA)
    /// channels.
    pub fn to_image(&self) -> Result<DynamicImage, FrameSyncError> {
        let (channels, height, width) = self.shape();
        let (width, height) = (width as u32, height as u32);
        let bytes = self.to_bytes();
        let image = match channels {
            1 => GrayImage::from_raw(width, height, bytes).map(DynamicImage::ImageLuma8),
            3 => RgbImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgb8),
            4 => RgbaImage::from_raw(width, height, bytes).map(DynamicImage::ImageRgba8),
            other => {
                return Err(FrameSyncError::Format(format!(
                    "cannot build an image from {other} channels"
                )));
            }
        };
        image.ok_or_else(|| FrameSyncError::Format("tensor shape does not match its data".into()))
    }
}

/// Convert an interleaved 8-bit buffer to a channel-first `f32` tensor in
/// `[0, 1]`.
///
/// # Errors
///
/// [`FrameSyncError::Format`] if a dimension is zero or the buffer length is
/// not `height * width * channels`.
pub fn normalize(
    buffer: &[u8],
    height: usize,
    width: usize,
    channels: usize,
) -> Result<FrameTensor, FrameSyncError> {
    if height == 0 || width == 0 || channels == 0 {
        return Err(FrameSyncError::Format(format!(
            "zero-sized frame {height}x{width}x{channels}"
        )));
    }

    let expected = height
        .checked_mul(width)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| FrameSyncError::Format("frame dimensions overflow".to_string()))?;
    if buffer.len() != expected {
        return Err(FrameSyncError::Format(format!(
            "expected {expected} bytes for a {height}x{width}x{channels} frame, got {}",
            buffer.len()
        )));
    }

    let scaled: Vec<f32> = buffer.iter().map(|&byte| f32::from(byte) / 255.0).collect();
    let interleaved = Array3::from_shape_vec((height, width, channels), scaled)
        .map_err(|error| FrameSyncError::Format(error.to_string()))?;
    let data = interleaved
        .permuted_axes([2, 0, 1])
        .as_standard_layout()
        .into_owned();

    Ok(FrameTensor { data })
}

/// Normalize a decoded RGB24 frame.
pub fn normalize_frame(frame: &DecodedFrame) -> Result<FrameTensor, FrameSyncError> {
    normalize(
        &frame.data,
        frame.height as usize,
        frame.width as usize,
        DecodedFrame::CHANNELS,
    )
}

/// Stack equally shaped tensors into one `N × C × H × W` array.
///
/// An empty slice yields an array of shape `(0, 0, 0, 0)`.
///
/// # Errors
///
/// [`FrameSyncError::Format`] if the tensors differ in shape.
pub fn stack(frames: &[FrameTensor]) -> Result<Array4<f32>, FrameSyncError> {
    if frames.is_empty() {
        return Ok(Array4::zeros((0, 0, 0, 0)));
    }

    let views: Vec<ArrayView3<'_, f32>> = frames.iter().map(|frame| frame.data.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|error| {
        FrameSyncError::Format(format!("cannot stack frames of different shapes: {error}"))
    })
}
