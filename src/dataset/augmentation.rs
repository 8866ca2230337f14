//! Data Augmentation Module for Wildfire Imagery
//!
//! On-the-fly image augmentations for the training split. Validation and
//! test images are only resized.
//!
//! Training pipeline order:
//! random resized crop -> rotation -> flips -> colour jitter -> translation

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{Result, WildfireError};

/// Configuration for data augmentation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AugmentationConfig {
    /// Lower bound of the random crop area, as a fraction of the image
    pub crop_scale_min: f32,
    /// Upper bound of the random crop area
    pub crop_scale_max: f32,
    /// Maximum rotation angle in degrees (applies ±rotation_degrees)
    pub rotation_degrees: f32,
    /// Probability of applying horizontal flip (0.0 - 1.0)
    pub horizontal_flip_prob: f32,
    /// Probability of applying vertical flip (0.0 - 1.0)
    pub vertical_flip_prob: f32,
    /// Brightness factor range (1.0 ± brightness)
    pub brightness: f32,
    /// Contrast factor range (1.0 ± contrast)
    pub contrast: f32,
    /// Saturation factor range (1.0 ± saturation)
    pub saturation: f32,
    /// Maximum translation as a fraction of width/height
    pub translate: f32,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            crop_scale_min: 0.8,
            crop_scale_max: 1.0,
            rotation_degrees: 20.0,
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.2,
            brightness: 0.3,
            contrast: 0.3,
            saturation: 0.3,
            translate: 0.1,
        }
    }
}

impl AugmentationConfig {
    /// Geometric-only preset used by the FireNet pipeline
    pub fn geometric() -> Self {
        Self {
            crop_scale_min: 0.85,
            crop_scale_max: 1.0,
            rotation_degrees: 25.0,
            horizontal_flip_prob: 0.5,
            vertical_flip_prob: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            translate: 0.1,
        }
    }

    /// Disable all augmentations (for validation/inference)
    pub fn none() -> Self {
        Self {
            crop_scale_min: 1.0,
            crop_scale_max: 1.0,
            rotation_degrees: 0.0,
            horizontal_flip_prob: 0.0,
            vertical_flip_prob: 0.0,
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            translate: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let probs = [self.horizontal_flip_prob, self.vertical_flip_prob];
        if probs.iter().any(|p| !(0.0..=1.0).contains(p)) {
            return Err(WildfireError::Config(
                "flip probabilities must be in [0, 1]".to_string(),
            ));
        }
        if !(self.crop_scale_min > 0.0
            && self.crop_scale_min <= self.crop_scale_max
            && self.crop_scale_max <= 1.0)
        {
            return Err(WildfireError::Config(
                "crop scale must satisfy 0 < min <= max <= 1".to_string(),
            ));
        }
        let jitter = [self.brightness, self.contrast, self.saturation];
        if jitter.iter().any(|j| !(0.0..1.0).contains(j)) {
            return Err(WildfireError::Config(
                "colour jitter strengths must be in [0, 1)".to_string(),
            ));
        }
        if !(0.0..0.5).contains(&self.translate) || self.rotation_degrees < 0.0 {
            return Err(WildfireError::Config(
                "translate must be in [0, 0.5) and rotation_degrees >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Image augmenter that applies random transformations
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    image_size: u32,
}

impl Augmenter {
    /// Create a new augmenter with the given configuration
    pub fn new(config: AugmentationConfig, image_size: u32) -> Self {
        Self { config, image_size }
    }

    /// Create an augmenter that only resizes
    pub fn no_augmentation(image_size: u32) -> Self {
        Self::new(AugmentationConfig::none(), image_size)
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    /// Resize (and augment when `rng` is given), returning CHW floats in [0, 1]
    pub fn preprocess(&self, img: DynamicImage, rng: Option<&mut ChaCha8Rng>) -> Vec<f32> {
        let size = self.image_size;
        let img = match rng {
            Some(rng) => self.augment(img, rng),
            None => img.resize_exact(size, size, FilterType::Triangle),
        };
        to_chw(&img.to_rgb8())
    }

    /// Apply the full training pipeline; the output is `image_size` square
    pub fn augment(&self, img: DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let size = self.image_size;
        let mut result = self
            .random_resized_crop(&img, rng)
            .resize_exact(size, size, FilterType::Triangle);

        if self.config.rotation_degrees > 0.0 {
            let angle = rng.gen_range(-self.config.rotation_degrees..=self.config.rotation_degrees);
            result = self.rotate(&result, angle);
        }

        if rng.gen::<f32>() < self.config.horizontal_flip_prob {
            result = result.fliph();
        }

        if rng.gen::<f32>() < self.config.vertical_flip_prob {
            result = result.flipv();
        }

        if self.config.brightness > 0.0 {
            let factor = 1.0 + rng.gen_range(-self.config.brightness..=self.config.brightness);
            result = self.adjust_brightness(&result, factor);
        }

        if self.config.contrast > 0.0 {
            let factor = 1.0 + rng.gen_range(-self.config.contrast..=self.config.contrast);
            result = self.adjust_contrast(&result, factor);
        }

        if self.config.saturation > 0.0 {
            let factor = 1.0 + rng.gen_range(-self.config.saturation..=self.config.saturation);
            result = self.adjust_saturation(&result, factor);
        }

        if self.config.translate > 0.0 {
            let max_dx = self.config.translate * size as f32;
            let dx = rng.gen_range(-max_dx..=max_dx).round() as i64;
            let dy = rng.gen_range(-max_dx..=max_dx).round() as i64;
            result = self.translate(&result, dx, dy);
        }

        result
    }

    /// Crop a random region covering `crop_scale` of the area with aspect
    /// ratio in [3/4, 4/3]; falls back to a centre crop
    fn random_resized_crop(&self, img: &DynamicImage, rng: &mut ChaCha8Rng) -> DynamicImage {
        let (width, height) = img.dimensions();
        let area = (width * height) as f32;
        let (log_lo, log_hi) = ((3.0f32 / 4.0).ln(), (4.0f32 / 3.0).ln());

        for _ in 0..10 {
            let target_area = area
                * rng.gen_range(self.config.crop_scale_min..=self.config.crop_scale_max);
            let aspect = rng.gen_range(log_lo..=log_hi).exp();

            let w = (target_area * aspect).sqrt().round() as u32;
            let h = (target_area / aspect).sqrt().round() as u32;

            if w > 0 && h > 0 && w <= width && h <= height {
                let x = rng.gen_range(0..=width - w);
                let y = rng.gen_range(0..=height - h);
                return img.crop_imm(x, y, w, h);
            }
        }

        let side = width.min(height);
        img.crop_imm((width - side) / 2, (height - side) / 2, side, side)
    }

    /// Rotate image by the given angle in degrees around its centre
    fn rotate(&self, img: &DynamicImage, angle_degrees: f32) -> DynamicImage {
        if angle_degrees.abs() < 0.1 {
            return img.clone();
        }

        let angle_rad = angle_degrees.to_radians();
        let (width, height) = img.dimensions();
        let rgb = img.to_rgb8();

        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let (sin_a, cos_a) = angle_rad.sin_cos();

        let output = ImageBuffer::from_fn(width, height, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let src_x = cx + dx * cos_a + dy * sin_a;
            let src_y = cy - dx * sin_a + dy * cos_a;
            bilinear_sample(&rgb, src_x, src_y)
        });

        DynamicImage::ImageRgb8(output)
    }

    /// Shift the image, filling uncovered pixels with black
    fn translate(&self, img: &DynamicImage, dx: i64, dy: i64) -> DynamicImage {
        if dx == 0 && dy == 0 {
            return img.clone();
        }
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let output = ImageBuffer::from_fn(width, height, |x, y| {
            let sx = x as i64 - dx;
            let sy = y as i64 - dy;
            if sx >= 0 && sy >= 0 && sx < width as i64 && sy < height as i64 {
                *rgb.get_pixel(sx as u32, sy as u32)
            } else {
                Rgb([0, 0, 0])
            }
        });

        DynamicImage::ImageRgb8(output)
    }

    /// Scale all channels by `factor`
    fn adjust_brightness(&self, img: &DynamicImage, factor: f32) -> DynamicImage {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let output = ImageBuffer::from_fn(width, height, |x, y| {
            let p = rgb.get_pixel(x, y);
            Rgb([
                (p[0] as f32 * factor).clamp(0.0, 255.0) as u8,
                (p[1] as f32 * factor).clamp(0.0, 255.0) as u8,
                (p[2] as f32 * factor).clamp(0.0, 255.0) as u8,
            ])
        });

        DynamicImage::ImageRgb8(output)
    }

    /// Blend with the mean luminance
    fn adjust_contrast(&self, img: &DynamicImage, factor: f32) -> DynamicImage {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let count = (width * height).max(1) as f64;
        let sum: f64 = rgb.pixels().map(|p| luminance(p) as f64).sum();
        let mean = (sum / count) as f32;

        let output = ImageBuffer::from_fn(width, height, |x, y| {
            let p = rgb.get_pixel(x, y);
            Rgb([
                (mean + factor * (p[0] as f32 - mean)).clamp(0.0, 255.0) as u8,
                (mean + factor * (p[1] as f32 - mean)).clamp(0.0, 255.0) as u8,
                (mean + factor * (p[2] as f32 - mean)).clamp(0.0, 255.0) as u8,
            ])
        });

        DynamicImage::ImageRgb8(output)
    }

    /// Blend each pixel with its grayscale value
    fn adjust_saturation(&self, img: &DynamicImage, factor: f32) -> DynamicImage {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();

        let output = ImageBuffer::from_fn(width, height, |x, y| {
            let p = rgb.get_pixel(x, y);
            let gray = luminance(p);
            Rgb([
                (gray + factor * (p[0] as f32 - gray)).clamp(0.0, 255.0) as u8,
                (gray + factor * (p[1] as f32 - gray)).clamp(0.0, 255.0) as u8,
                (gray + factor * (p[2] as f32 - gray)).clamp(0.0, 255.0) as u8,
            ])
        });

        DynamicImage::ImageRgb8(output)
    }
}

fn luminance(p: &Rgb<u8>) -> f32 {
    0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32
}

/// Sample a pixel using bilinear interpolation (black outside the image)
fn bilinear_sample(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (width, height) = img.dimensions();

    if x < 0.0 || y < 0.0 || x > width as f32 - 1.0 || y > height as f32 - 1.0 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut result = [0u8; 3];
    for c in 0..3 {
        let v = p00[c] as f32 * (1.0 - fx) * (1.0 - fy)
            + p10[c] as f32 * fx * (1.0 - fy)
            + p01[c] as f32 * (1.0 - fx) * fy
            + p11[c] as f32 * fx * fy;
        result[c] = v.round().clamp(0.0, 255.0) as u8;
    }

    Rgb(result)
}

/// Convert to CHW layout scaled to [0, 1]
fn to_chw(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let plane = (width * height) as usize;
    let mut data = vec![0.0f32; 3 * plane];

    for (i, pixel) in img.pixels().enumerate() {
        data[i] = pixel[0] as f32 / 255.0;
        data[plane + i] = pixel[1] as f32 / 255.0;
        data[2 * plane + i] = pixel[2] as f32 / 255.0;
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x * 4 % 256) as u8, (y * 4 % 256) as u8, 128])
        }))
    }

    #[test]
    fn test_preprocess_without_rng_only_resizes() {
        let augmenter = Augmenter::new(AugmentationConfig::default(), 32);
        let data = augmenter.preprocess(gradient_image(64, 48), None);

        assert_eq!(data.len(), 3 * 32 * 32);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
        // Blue channel is constant 128
        assert!((data[2 * 32 * 32] - 128.0 / 255.0).abs() < 1.5 / 255.0);
    }

    #[test]
    fn test_augment_output_size_and_determinism() {
        let augmenter = Augmenter::new(AugmentationConfig::default(), 40);
        let img = gradient_image(100, 80);

        let mut rng_a = ChaCha8Rng::seed_from_u64(7);
        let mut rng_b = ChaCha8Rng::seed_from_u64(7);
        let a = augmenter.augment(img.clone(), &mut rng_a);
        let b = augmenter.augment(img, &mut rng_b);

        assert_eq!(a.dimensions(), (40, 40));
        assert_eq!(a.to_rgb8().into_raw(), b.to_rgb8().into_raw());
    }

    #[test]
    fn test_random_resized_crop_bounds() {
        let augmenter = Augmenter::new(AugmentationConfig::default(), 32);
        let img = gradient_image(50, 50);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..20 {
            let crop = augmenter.random_resized_crop(&img, &mut rng);
            let (w, h) = crop.dimensions();
            assert!(w <= 50 && h <= 50);
            // At least 80% of the area, modulo rounding and the aspect clamp
            assert!((w * h) as f32 >= 0.75 * 2500.0);
        }
    }

    #[test]
    fn test_translate_fills_black() {
        let augmenter = Augmenter::no_augmentation(8);
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(8, 8, Rgb([200, 200, 200])));
        let shifted = augmenter.translate(&img, 2, 0).to_rgb8();

        assert_eq!(shifted.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(shifted.get_pixel(5, 5), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_saturation_zero_is_grayscale() {
        let augmenter = Augmenter::no_augmentation(4);
        let img = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(4, 4, Rgb([255, 0, 0])));
        let gray = augmenter.adjust_saturation(&img, 0.0).to_rgb8();
        let p = gray.get_pixel(1, 1);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_config_validation() {
        assert!(AugmentationConfig::default().validate().is_ok());
        assert!(AugmentationConfig::none().validate().is_ok());
        let bad = AugmentationConfig {
            crop_scale_min: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
