//! Image augmentation and normalization pipeline.
//!
//! Training and validation use distinct pipelines: the trainer swaps the
//! training pipeline in for the train pass and the plain resize+normalize
//! pipeline for validation, without re-indexing the split.

use crate::types::{DatasetResult, MaskDatasetError};
use image::imageops::FilterType;
use image::RgbImage;
use rand::{Rng, SeedableRng};
use std::cmp::max;
use std::path::Path;

pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    /// Resize every image to this (width, height) before anything else.
    pub target_size: (u32, u32),
    /// Probability of a horizontal flip.
    pub flip_horizontal_prob: f32,
    /// Probability of a zoom in/out with center crop/pad.
    pub scale_jitter_prob: f32,
    pub scale_jitter_min: f32,
    pub scale_jitter_max: f32,
    /// Probability of punching rectangular holes into the image.
    pub coarse_dropout_prob: f32,
    pub coarse_dropout_holes: usize,
    /// Hole side length as a fraction of the image side.
    pub coarse_dropout_max_frac: f32,
    /// Per-channel normalization applied last.
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Seed for per-sample deterministic augmentation.
    pub seed: Option<u64>,
}

impl TransformPipeline {
    /// Training-time augmentation: flip, scale jitter, coarse dropout.
    pub fn train(seed: Option<u64>) -> Self {
        Self {
            target_size: (224, 224),
            flip_horizontal_prob: 0.5,
            scale_jitter_prob: 0.5,
            scale_jitter_min: 0.85,
            scale_jitter_max: 1.15,
            coarse_dropout_prob: 1.0,
            coarse_dropout_holes: 20,
            coarse_dropout_max_frac: 0.08,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            seed,
        }
    }

    /// Validation-time pipeline: resize and normalize only.
    pub fn val() -> Self {
        Self {
            target_size: (224, 224),
            flip_horizontal_prob: 0.0,
            scale_jitter_prob: 0.0,
            scale_jitter_min: 1.0,
            scale_jitter_max: 1.0,
            coarse_dropout_prob: 0.0,
            coarse_dropout_holes: 0,
            coarse_dropout_max_frac: 0.0,
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
            seed: None,
        }
    }

    pub fn describe(&self) -> String {
        format!(
            "target_size={}x{} flip_p={:.2} scale_jitter_p={:.2} range=[{:.2},{:.2}] dropout_p={:.2} holes={} seed={}",
            self.target_size.0,
            self.target_size.1,
            self.flip_horizontal_prob,
            self.scale_jitter_prob,
            self.scale_jitter_min,
            self.scale_jitter_max,
            self.coarse_dropout_prob,
            self.coarse_dropout_holes,
            self.seed
                .map(|s| s.to_string())
                .unwrap_or_else(|| "none".to_string())
        )
    }

    /// Loads, augments, and normalizes one image into CHW f32 layout.
    /// `sample_ord` distinguishes samples under a fixed seed so the same
    /// image gets the same augmentation within a run but different samples
    /// do not share draws.
    pub fn load(&self, path: &Path, sample_ord: u64) -> DatasetResult<Vec<f32>> {
        let img = image::open(path)
            .map_err(|source| MaskDatasetError::Image {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        Ok(self.apply(img, sample_ord))
    }

    pub fn apply(&self, img: RgbImage, sample_ord: u64) -> Vec<f32> {
        // Choose RNG: seeded if provided (per-sample deterministic), else thread-local.
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = self.seed {
            let mixed = seed ^ sample_ord;
            seeded_rng = rand::rngs::StdRng::seed_from_u64(mixed);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };

        let (w, h) = self.target_size;
        let mut img = image::imageops::resize(&img, w, h, FilterType::Triangle);

        maybe_hflip(&mut img, self.flip_horizontal_prob, rng);
        maybe_scale_jitter(
            &mut img,
            self.scale_jitter_prob,
            self.scale_jitter_min,
            self.scale_jitter_max,
            rng,
        );
        maybe_coarse_dropout(
            &mut img,
            self.coarse_dropout_prob,
            self.coarse_dropout_holes,
            self.coarse_dropout_max_frac,
            rng,
        );

        self.normalize_chw(&img)
    }

    fn normalize_chw(&self, img: &RgbImage) -> Vec<f32> {
        let (w, h) = img.dimensions();
        let plane = (w * h) as usize;
        let mut chw = vec![0.0f32; plane * 3];
        for (y, x, pixel) in img.enumerate_pixels() {
            let base = (y * w + x) as usize;
            for c in 0..3 {
                let v = pixel[c] as f32 / 255.0;
                chw[c * plane + base] = (v - self.mean[c]) / self.std[c];
            }
        }
        chw
    }

    /// Undoes normalization for visualization; values clamp to u8 range.
    pub fn denormalize_chw(&self, chw: &[f32], width: u32, height: u32) -> RgbImage {
        let plane = (width * height) as usize;
        let mut img = RgbImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                let base = (y * width + x) as usize;
                let mut pixel = [0u8; 3];
                for c in 0..3 {
                    let v = chw
                        .get(c * plane + base)
                        .copied()
                        .unwrap_or(0.0);
                    let v = v * self.std[c] + self.mean[c];
                    pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
                }
                img.put_pixel(x, y, image::Rgb(pixel));
            }
        }
        img
    }
}

pub(crate) fn maybe_hflip(img: &mut RgbImage, prob: f32, rng: &mut dyn rand::RngCore) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(img);
    }
}

pub(crate) fn maybe_scale_jitter(
    img: &mut RgbImage,
    prob: f32,
    min_scale: f32,
    max_scale: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || min_scale <= 0.0 || max_scale <= min_scale {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let scale = rng.random_range(min_scale..max_scale);
    let (w, h) = img.dimensions();
    let new_w = max(1, (w as f32 * scale).round() as u32);
    let new_h = max(1, (h as f32 * scale).round() as u32);

    let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::new(w, h);

    if new_w >= w && new_h >= h {
        // crop center
        let x0 = ((new_w - w) / 2) as i64;
        let y0 = ((new_h - h) / 2) as i64;
        image::imageops::replace(&mut canvas, &resized, -x0, -y0);
    } else {
        // pad center
        let x0 = ((w - new_w) / 2) as i64;
        let y0 = ((h - new_h) / 2) as i64;
        image::imageops::replace(&mut canvas, &resized, x0, y0);
    }

    *img = canvas;
}

pub(crate) fn maybe_coarse_dropout(
    img: &mut RgbImage,
    prob: f32,
    holes: usize,
    max_frac: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || holes == 0 || max_frac <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let (w, h) = img.dimensions();
    let max_side = max(1, (w.min(h) as f32 * max_frac) as u32);
    for _ in 0..holes {
        let hole_w = rng.random_range(1..=max_side);
        let hole_h = rng.random_range(1..=max_side);
        let x0 = rng.random_range(0..w.saturating_sub(hole_w).max(1));
        let y0 = rng.random_range(0..h.saturating_sub(hole_h).max(1));
        for y in y0..(y0 + hole_h).min(h) {
            for x in x0..(x0 + hole_w).min(w) {
                img.put_pixel(x, y, image::Rgb([0, 0, 0]));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_then_denormalize_recovers_pixels() {
        let mut img = RgbImage::new(4, 4);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x * 50) as u8, (y * 50) as u8, 128]);
        }
        let pipeline = TransformPipeline::val();
        let chw = pipeline.normalize_chw(&img);
        let restored = pipeline.denormalize_chw(&chw, 4, 4);
        for (a, b) in img.pixels().zip(restored.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i16 - b[c] as i16).abs() <= 1);
            }
        }
    }

    #[test]
    fn seeded_augmentation_is_deterministic_per_sample() {
        let mut img = RgbImage::new(32, 32);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x * 8) as u8, (y * 8) as u8, 64]);
        }
        let pipeline = TransformPipeline::train(Some(42));
        let a = pipeline.apply(img.clone(), 3);
        let b = pipeline.apply(img, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn val_pipeline_applies_no_augmentation() {
        let mut img = RgbImage::new(224, 224);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = image::Rgb([(x % 256) as u8, 0, 0]);
        }
        let pipeline = TransformPipeline::val();
        let a = pipeline.apply(img.clone(), 0);
        let b = pipeline.apply(img, 999);
        assert_eq!(a, b);
    }

    #[test]
    fn coarse_dropout_blacks_out_pixels() {
        let mut img = RgbImage::from_pixel(64, 64, image::Rgb([255, 255, 255]));
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        maybe_coarse_dropout(&mut img, 1.0, 20, 0.1, &mut rng);
        let black = img.pixels().filter(|p| p.0 == [0, 0, 0]).count();
        assert!(black > 0);
    }
}
