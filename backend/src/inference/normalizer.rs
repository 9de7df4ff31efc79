//! Turns an uploaded photo into the tensor the classifier was trained on.
//!
//! Steps run in a fixed order: decode, force RGB, median denoise at the
//! original resolution, resize to the model input, add the batch axis, then
//! apply the backbone's input normalization. Changing the order changes
//! predictions without raising an error.

use std::path::Path;

use image::{DynamicImage, ImageFormat, ImageReader, RgbImage, imageops};
use ndarray::Array4;

use super::config::{NormalizationMode, PreprocessingConfig};
use super::error::DecodeError;

/// ImageNet channel means on the 0..255 scale, BGR order.
const CAFFE_MEAN_BGR: [f32; 3] = [103.939, 116.779, 123.68];
/// ImageNet normalization mean values (RGB).
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet normalization std values (RGB).
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Uploaded bytes plus the format sniffed from their magic number, if any.
#[derive(Debug, Clone)]
pub struct RawImage {
    bytes: Vec<u8>,
    format: Option<ImageFormat>,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>) -> Self {
        let format = image::guess_format(&bytes).ok();
        Self { bytes, format }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// `[1, height, width, 3]` input for a single forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Array4<f32>,
}

impl NormalizedTensor {
    pub fn zeros(shape: [usize; 4]) -> Self {
        Self {
            data: Array4::zeros(shape),
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        let dims = self.data.dim();
        [dims.0, dims.1, dims.2, dims.3]
    }

    pub fn view(&self) -> ndarray::ArrayView4<'_, f32> {
        self.data.view()
    }

    /// Values in row-major (NHWC) order.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    config: PreprocessingConfig,
}

impl Normalizer {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn output_shape(&self) -> [usize; 4] {
        self.config.tensor_shape()
    }

    pub fn normalize(&self, raw: &RawImage) -> Result<NormalizedTensor, DecodeError> {
        let image = decode_bytes(raw)?;
        self.normalize_image(image)
    }

    pub fn normalize_file(&self, path: &Path) -> Result<NormalizedTensor, DecodeError> {
        let image = decode_file(path)?;
        self.normalize_image(image)
    }

    /// Runs every step after decoding.
    pub fn normalize_image(&self, image: DynamicImage) -> Result<NormalizedTensor, DecodeError> {
        let rgb = image.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(DecodeError("image has no pixels".to_string()));
        }

        let denoised = if self.config.denoise.enabled {
            median_denoise(&rgb, self.config.denoise.window)
        } else {
            rgb
        };

        let [width, height] = self.config.image.size;
        let resized = imageops::resize(
            &denoised,
            width,
            height,
            self.config.image.resize_method.into(),
        );

        let batched = to_batch(&resized)?;
        Ok(NormalizedTensor {
            data: apply_normalization(batched, self.config.normalization.mode),
        })
    }
}

pub fn decode_bytes(raw: &RawImage) -> Result<DynamicImage, DecodeError> {
    if raw.is_empty() {
        return Err(DecodeError("empty payload".to_string()));
    }
    let format = raw
        .format()
        .ok_or_else(|| DecodeError("unrecognized image format".to_string()))?;
    Ok(image::load_from_memory_with_format(raw.bytes(), format)?)
}

pub fn decode_file(path: &Path) -> Result<DynamicImage, DecodeError> {
    let reader = ImageReader::open(path)
        .map_err(|e| DecodeError(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| DecodeError(e.to_string()))?;
    if reader.format().is_none() {
        return Err(DecodeError("unrecognized image format".to_string()));
    }
    Ok(reader.decode()?)
}

/// Per-channel median over a `window`×`window` neighbourhood. Borders
/// replicate the edge pixel.
pub fn median_denoise(image: &RgbImage, window: u32) -> RgbImage {
    let radius = window / 2;
    imageproc::filter::median_filter(image, radius, radius)
}

fn to_batch(image: &RgbImage) -> Result<Array4<f32>, DecodeError> {
    let (width, height) = image.dimensions();
    let values: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();
    Array4::from_shape_vec((1, height as usize, width as usize, 3), values)
        .map_err(|e| DecodeError(e.to_string()))
}

fn apply_normalization(mut batch: Array4<f32>, mode: NormalizationMode) -> Array4<f32> {
    for mut pixel in batch.lanes_mut(ndarray::Axis(3)) {
        let [r, g, b] = [pixel[0], pixel[1], pixel[2]];
        let normalized = match mode {
            NormalizationMode::Caffe => [
                b - CAFFE_MEAN_BGR[0],
                g - CAFFE_MEAN_BGR[1],
                r - CAFFE_MEAN_BGR[2],
            ],
            NormalizationMode::Torch => [
                (r / 255.0 - IMAGENET_MEAN[0]) / IMAGENET_STD[0],
                (g / 255.0 - IMAGENET_MEAN[1]) / IMAGENET_STD[1],
                (b / 255.0 - IMAGENET_MEAN[2]) / IMAGENET_STD[2],
            ],
            NormalizationMode::Tf => [r / 127.5 - 1.0, g / 127.5 - 1.0, b / 127.5 - 1.0],
        };
        pixel[0] = normalized[0];
        pixel[1] = normalized[1];
        pixel[2] = normalized[2];
    }
    batch
}
