//! Image quality estimate for plate crops.

use image::GrayImage;

/// Sharpness, contrast and exposure combined into one number.
///
/// `0.5 · var(laplacian) + 0.3 · std + 0.2 · min(mean, 255 − mean)`.
/// Empty images score `0`.
pub fn frame_quality(image: &GrayImage) -> f32 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }

    let (mean, std) = mean_std(image.pixels().map(|p| p.0[0] as f64));
    let sharpness = laplacian_variance(image);
    let exposure = mean.min(255.0 - mean);

    (sharpness * 0.5 + std * 0.3 + exposure * 0.2) as f32
}

/// Variance of the 4-neighbour Laplacian (reflect-101 borders)
pub fn laplacian_variance(image: &GrayImage) -> f64 {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return 0.0;
    }
    let at = |x: i64, y: i64| -> f64 {
        let x = reflect(x, width);
        let y = reflect(y, height);
        image.get_pixel(x, y).0[0] as f64
    };

    let responses = (0..height as i64).flat_map(|y| {
        (0..width as i64).map(move |x| {
            at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y)
        })
    });
    let (_, std) = mean_std(responses);
    std * std
}

fn reflect(i: i64, len: u32) -> u32 {
    let len = len as i64;
    if len == 1 {
        return 0;
    }
    let r = if i < 0 {
        -i
    } else if i >= len {
        2 * len - 2 - i
    } else {
        i
    };
    r.clamp(0, len - 1) as u32
}

/// Population mean and standard deviation
fn mean_std(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let mut n = 0.0;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values {
        n += 1.0;
        sum += v;
        sum_sq += v * v;
    }
    if n == 0.0 {
        return (0.0, 0.0);
    }
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_flat_image_scores_exposure_only() {
        let image = GrayImage::from_pixel(8, 8, Luma([100]));
        assert_eq!(laplacian_variance(&image), 0.0);
        assert!((frame_quality(&image) - 20.0).abs() < 1e-4);
    }

    #[test]
    fn test_sharp_edges_raise_quality() {
        let flat = GrayImage::from_pixel(16, 16, Luma([128]));
        let stripes = GrayImage::from_fn(16, 16, |x, _| if x % 2 == 0 { Luma([20]) } else { Luma([230]) });
        assert!(frame_quality(&stripes) > frame_quality(&flat));
        assert!(frame_quality(&stripes) > 100.0);
    }

    #[test]
    fn test_empty_image() {
        assert_eq!(frame_quality(&GrayImage::new(0, 0)), 0.0);
        assert_eq!(frame_quality(&GrayImage::new(1, 1)), 0.0);
    }
}
