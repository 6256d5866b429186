//! Image preprocessing for ImageNet classifiers.
//!
//! The pipeline is fixed: resize the shorter edge, center-crop, scale to
//! `[0, 1]`, then normalize each channel with `(x - mean[c]) / std[c]`.
//! The result is a CHW tensor whose shape depends only on the crop size.

use image::{imageops, imageops::FilterType, DynamicImage, RgbImage};
use ndarray::{Array3, Array4, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Standard ImageNet per-channel mean.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Standard ImageNet per-channel standard deviation.
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Error, PartialEq)]
pub enum PreprocessError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("image {width}x{height} is too elongated to resize its shorter edge to {target}")]
    ResizeOverflow { width: u32, height: u32, target: u32 },
    #[error("image {width}x{height} is smaller than the {crop}x{crop} center crop")]
    UndersizedCrop { width: u32, height: u32, crop: u32 },
    #[error("invalid preprocessing config: {0}")]
    InvalidConfig(&'static str),
}

/// Parameters of the preprocessing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Length of the shorter edge after resizing.
    pub resize_shorter: u32,
    /// Side of the square center crop.
    pub crop: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resize_shorter: 256,
            crop: 224,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.resize_shorter == 0 {
            return Err(PreprocessError::InvalidConfig("resize_shorter must be positive"));
        }
        if self.crop == 0 {
            return Err(PreprocessError::InvalidConfig("crop must be positive"));
        }
        if self.std.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
            return Err(PreprocessError::InvalidConfig("std must be finite and positive"));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err(PreprocessError::InvalidConfig("mean must be finite"));
        }
        Ok(())
    }
}

/// Turns decoded images into normalized model input.
#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            config: PreprocessConfig::default(),
        }
    }
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Result<Self, PreprocessError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Shape of a single preprocessed image, `[3, crop, crop]`.
    pub fn output_shape(&self) -> [usize; 3] {
        let crop = self.config.crop as usize;
        [3, crop, crop]
    }

    /// Run the full pipeline on one image, producing a `(3, crop, crop)` tensor.
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Array3<f32>, PreprocessError> {
        let rgb = image.to_rgb8();
        let resized = resize_shorter(&rgb, self.config.resize_shorter)?;
        let cropped = center_crop(&resized, self.config.crop)?;
        let mut tensor = to_unit_chw(&cropped);
        normalize(&mut tensor, &self.config.mean, &self.config.std);
        Ok(tensor)
    }

    /// Same as [`Preprocessor::preprocess`] with a leading batch axis of 1.
    pub fn preprocess_batch(&self, image: &DynamicImage) -> Result<Array4<f32>, PreprocessError> {
        Ok(self.preprocess(image)?.insert_axis(Axis(0)))
    }
}

/// Resize so the shorter edge equals `target`, keeping the aspect ratio.
/// The longer edge is truncated, matching torchvision's `Resize(int)`.
pub fn resize_shorter(image: &RgbImage, target: u32) -> Result<RgbImage, PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage { width, height });
    }

    let (short, long) = if width <= height { (width, height) } else { (height, width) };
    let scaled_long = u32::try_from(u64::from(target) * u64::from(long) / u64::from(short))
        .map_err(|_| PreprocessError::ResizeOverflow { width, height, target })?;
    let (new_width, new_height) = if width <= height {
        (target, scaled_long)
    } else {
        (scaled_long, target)
    };

    if (new_width, new_height) == (width, height) {
        return Ok(image.clone());
    }
    Ok(imageops::resize(image, new_width, new_height, FilterType::Triangle))
}

/// Cut a `size x size` square from the middle of the image.
///
/// Offsets round half to even, as torchvision's `CenterCrop` does.
/// Images smaller than the crop are rejected rather than padded.
pub fn center_crop(image: &RgbImage, size: u32) -> Result<RgbImage, PreprocessError> {
    let (width, height) = image.dimensions();
    if width < size || height < size {
        return Err(PreprocessError::UndersizedCrop {
            width,
            height,
            crop: size,
        });
    }
    let left = ((width - size) as f64 / 2.0).round_ties_even() as u32;
    let top = ((height - size) as f64 / 2.0).round_ties_even() as u32;
    Ok(imageops::crop_imm(image, left, top, size, size).to_image())
}

/// HWC `u8` pixels to a CHW `f32` tensor in `[0, 1]`.
pub fn to_unit_chw(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    Array3::from_shape_fn((3, height as usize, width as usize), |(c, y, x)| {
        f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0
    })
}

/// In-place `(x - mean[c]) / std[c]` over a CHW tensor.
pub fn normalize(tensor: &mut Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) {
    for (c, mut channel) in tensor.axis_iter_mut(Axis(0)).enumerate() {
        channel.mapv_inplace(|v| (v - mean[c]) / std[c]);
    }
}

/// Inverse of [`normalize`]: `x * std[c] + mean[c]`.
pub fn denormalize(tensor: &mut Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) {
    for (c, mut channel) in tensor.axis_iter_mut(Axis(0)).enumerate() {
        channel.mapv_inplace(|v| v * std[c] + mean[c]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
    }

    /// Pixel colors encode their coordinates so crops can be located.
    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 0]))
    }

    #[test]
    fn test_output_shape_is_fixed() {
        let pre = Preprocessor::default();
        for (w, h) in [(224, 224), (256, 256), (640, 480), (300, 1200), (1000, 250)] {
            let tensor = pre.preprocess(&solid(w, h, 90)).unwrap();
            assert_eq!(tensor.shape(), &[3, 224, 224], "input {w}x{h}");
            assert!(tensor.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn test_small_images_are_upscaled_first() {
        let pre = Preprocessor::default();
        let tensor = pre.preprocess(&solid(32, 48, 200)).unwrap();
        assert_eq!(tensor.shape(), &[3, 224, 224]);
    }

    #[test]
    fn test_batch_axis() {
        let pre = Preprocessor::default();
        let batch = pre.preprocess_batch(&solid(256, 256, 10)).unwrap();
        assert_eq!(batch.shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn test_uniform_gray_normalizes_per_channel() {
        let pre = Preprocessor::default();
        let tensor = pre.preprocess(&solid(400, 300, 128)).unwrap();
        let scaled = 128.0 / 255.0;
        for c in 0..3 {
            let expected = (scaled - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            for v in tensor.index_axis(Axis(0), c).iter() {
                assert!((v - expected).abs() < 0.02, "channel {c}: {v} vs {expected}");
            }
        }
    }

    #[test]
    fn test_normalize_is_invertible() {
        let image = gradient(224, 224);
        let original = to_unit_chw(&image);
        let mut tensor = original.clone();
        normalize(&mut tensor, &IMAGENET_MEAN, &IMAGENET_STD);
        assert!(tensor.iter().zip(original.iter()).any(|(a, b)| (a - b).abs() > 1e-3));
        denormalize(&mut tensor, &IMAGENET_MEAN, &IMAGENET_STD);
        for (a, b) in tensor.iter().zip(original.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
        assert!(original.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_resize_shorter_keeps_aspect_ratio() {
        let resized = resize_shorter(&gradient(640, 480), 256).unwrap();
        assert_eq!(resized.dimensions(), (341, 256));

        let resized = resize_shorter(&gradient(300, 1000), 256).unwrap();
        assert_eq!(resized.dimensions(), (256, 853));
    }

    #[test]
    fn test_resize_noop_when_already_sized() {
        let image = gradient(256, 300);
        let resized = resize_shorter(&image, 256).unwrap();
        assert_eq!(resized, image);
    }

    #[test]
    fn test_center_crop_offsets() {
        let cropped = center_crop(&gradient(300, 256), 224).unwrap();
        assert_eq!(cropped.dimensions(), (224, 224));
        // (300 - 224) / 2 = 38, (256 - 224) / 2 = 16
        assert_eq!(cropped.get_pixel(0, 0).0, [38, 16, 0]);
        assert_eq!(cropped.get_pixel(223, 223).0, [(38 + 223) as u8, (16 + 223) as u8, 0]);
    }

    #[test]
    fn test_center_crop_half_pixel_rounds_to_even() {
        // 640x480 resizes to 341x256: (341 - 224) / 2 = 58.5 -> 58
        let cropped = center_crop(&gradient(341, 256), 224).unwrap();
        assert_eq!(cropped.get_pixel(0, 0).0, [58, 16, 0]);

        // (227 - 224) / 2 = 1.5 -> 2
        let cropped = center_crop(&gradient(227, 224), 224).unwrap();
        assert_eq!(cropped.get_pixel(0, 0).0, [2, 0, 0]);
    }

    #[test]
    fn test_center_crop_rejects_undersized() {
        let err = center_crop(&gradient(200, 300), 224).unwrap_err();
        assert_eq!(
            err,
            PreprocessError::UndersizedCrop {
                width: 200,
                height: 300,
                crop: 224
            }
        );
    }

    #[test]
    fn test_undersized_after_resize_is_an_error() {
        let config = PreprocessConfig {
            resize_shorter: 200,
            ..PreprocessConfig::default()
        };
        let pre = Preprocessor::new(config).unwrap();
        let err = pre.preprocess(&solid(500, 500, 0)).unwrap_err();
        assert!(matches!(err, PreprocessError::UndersizedCrop { crop: 224, .. }));
    }

    #[test]
    fn test_empty_image_is_an_error() {
        let pre = Preprocessor::default();
        let err = pre.preprocess(&solid(0, 0, 0)).unwrap_err();
        assert_eq!(err, PreprocessError::EmptyImage { width: 0, height: 0 });
    }

    #[test]
    fn test_invalid_config() {
        let config = PreprocessConfig {
            std: [0.229, 0.0, 0.225],
            ..PreprocessConfig::default()
        };
        assert!(matches!(
            Preprocessor::new(config),
            Err(PreprocessError::InvalidConfig(_))
        ));
        let config = PreprocessConfig {
            crop: 0,
            ..PreprocessConfig::default()
        };
        assert!(Preprocessor::new(config).is_err());
    }
}
