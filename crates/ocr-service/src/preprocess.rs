//! Preprocessing variants fed to the OCR engine.
//!
//! A plate crop is enhanced once (histogram equalisation, brightness and
//! contrast adjustment, denoising) and then fanned out into scaled,
//! binarised and edge-enhanced variants. The engine reads each variant and
//! the validator picks the best result.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::{contrast, edges, filter, morphology};
use serde::{Deserialize, Serialize};

/// Overall lighting of the scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightCondition {
    #[default]
    Normal,
    Dark,
    Bright,
}

/// Brightness and contrast adjustment applied before reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveParams {
    pub brightness_boost: f32,
    pub contrast_factor: f32,
}

impl Default for AdaptiveParams {
    fn default() -> Self {
        Self {
            brightness_boost: 1.0,
            contrast_factor: 1.0,
        }
    }
}

impl AdaptiveParams {
    /// Parameters for a local `hour` (0-23) and lighting.
    ///
    /// Night (before 06:00 or after 20:59) counts as dark.
    pub fn for_conditions(hour: u32, light: LightCondition) -> Self {
        if light == LightCondition::Dark || hour < 6 || hour > 20 {
            Self {
                brightness_boost: 1.3,
                contrast_factor: 1.5,
            }
        } else if light == LightCondition::Bright {
            Self {
                brightness_boost: 0.8,
                contrast_factor: 1.2,
            }
        } else {
            Self::default()
        }
    }
}

/// Variants in reading order plus the names of the steps applied
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub variants: Vec<GrayImage>,
    pub methods: Vec<String>,
}

const UPSCALES: [f32; 3] = [1.5, 2.0, 2.5];

/// Build all reading variants of `crop`.
///
/// Order: enhanced, enhanced ×1.5, ×2, ×2.5, adaptive threshold,
/// morphology, edge blend.
pub fn preprocess(crop: &GrayImage, params: AdaptiveParams) -> Preprocessed {
    let mut methods = Vec::with_capacity(7);

    let equalized = contrast::equalize_histogram(crop);
    methods.push("histogram_equalization".to_string());

    let adjusted = brightness_contrast(&equalized, params);
    methods.push("brightness_contrast".to_string());

    let enhanced = filter::median_filter(&adjusted, 1, 1);
    methods.push("median_denoise".to_string());

    let binary = gaussian_adaptive_threshold(&enhanced, 2);
    methods.push("adaptive_threshold".to_string());

    let morph = morphology::open(&morphology::close(&binary, Norm::LInf, 1), Norm::LInf, 1);
    methods.push("morphology".to_string());

    let edge_map = edges::canny(&enhanced, 50.0, 150.0);
    let edge_blend = blend(&enhanced, &edge_map, 0.8, 0.2);
    methods.push("edge_enhancement".to_string());

    let (width, height) = enhanced.dimensions();
    let mut variants = Vec::with_capacity(7);
    variants.push(enhanced.clone());
    for scale in UPSCALES {
        let w = ((width as f32 * scale) as u32).max(1);
        let h = ((height as f32 * scale) as u32).max(1);
        variants.push(imageops::resize(&enhanced, w, h, FilterType::CatmullRom));
    }
    methods.push("multi_scale".to_string());

    variants.push(binary);
    variants.push(morph);
    variants.push(edge_blend);

    Preprocessed { variants, methods }
}

/// `saturate(contrast · p + (brightness − 1) · 50)`
pub fn brightness_contrast(image: &GrayImage, params: AdaptiveParams) -> GrayImage {
    let beta = (params.brightness_boost - 1.0) * 50.0;
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = params.contrast_factor * image.get_pixel(x, y).0[0] as f32 + beta;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Binarise against a Gaussian-weighted local mean minus `offset`
fn gaussian_adaptive_threshold(image: &GrayImage, offset: i16) -> GrayImage {
    let local_mean = filter::gaussian_blur_f32(image, 2.0);
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y).0[0] as i16;
        let threshold = local_mean.get_pixel(x, y).0[0] as i16 - offset;
        if v > threshold {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

fn blend(a: &GrayImage, b: &GrayImage, wa: f32, wb: f32) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let v = a.get_pixel(x, y).0[0] as f32 * wa + b.get_pixel(x, y).0[0] as f32 * wb;
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate_like(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x / 4 + y / 6) % 2 == 0 {
                Luma([30])
            } else {
                Luma([210])
            }
        })
    }

    #[test]
    fn test_adaptive_params() {
        assert_eq!(
            AdaptiveParams::for_conditions(3, LightCondition::Normal).contrast_factor,
            1.5
        );
        assert_eq!(
            AdaptiveParams::for_conditions(21, LightCondition::Normal).brightness_boost,
            1.3
        );
        assert_eq!(
            AdaptiveParams::for_conditions(12, LightCondition::Dark).brightness_boost,
            1.3
        );
        assert_eq!(
            AdaptiveParams::for_conditions(12, LightCondition::Bright),
            AdaptiveParams {
                brightness_boost: 0.8,
                contrast_factor: 1.2
            }
        );
        assert_eq!(
            AdaptiveParams::for_conditions(20, LightCondition::Normal),
            AdaptiveParams::default()
        );
    }

    #[test]
    fn test_brightness_contrast_saturates() {
        let image = GrayImage::from_pixel(2, 2, Luma([200]));
        let params = AdaptiveParams {
            brightness_boost: 1.3,
            contrast_factor: 1.5,
        };
        let out = brightness_contrast(&image, params);
        assert_eq!(out.get_pixel(0, 0).0[0], 255);

        let dimmed = brightness_contrast(
            &GrayImage::from_pixel(1, 1, Luma([100])),
            AdaptiveParams {
                brightness_boost: 0.8,
                contrast_factor: 1.0,
            },
        );
        assert_eq!(dimmed.get_pixel(0, 0).0[0], 90);
    }

    #[test]
    fn test_preprocess_produces_all_variants() {
        let crop = plate_like(40, 12);
        let out = preprocess(&crop, AdaptiveParams::default());

        assert_eq!(out.variants.len(), 7);
        assert_eq!(out.methods.len(), 7);
        assert_eq!(out.variants[0].dimensions(), (40, 12));
        assert_eq!(out.variants[2].dimensions(), (80, 24));
        assert_eq!(out.variants[3].dimensions(), (100, 30));
        assert!(out.variants[4]
            .pixels()
            .all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(out.methods.last().map(String::as_str), Some("multi_scale"));
    }
}
