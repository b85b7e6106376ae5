use derive_builder::Builder;
use image::{RgbImage, imageops};
use imageproc::{drawing::draw_filled_rect_mut, filter::separable_filter_equal, rect::Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analysis::region::Region;

/// Smallest Gaussian kernel the renderer will use.
pub const MIN_BLUR_KERNEL: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedactionMode {
    #[default]
    Fill,
    Blur,
}

/// How regions are painted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct RedactionConfig {
    pub mode: RedactionMode,
    pub fill_color: [u8; 3],
    pub blur_kernel_size: u32,
    pub blur_sigma: f32,
    /// Pixels added on every side of every box before clipping.
    pub pad: i32,
    /// Merge intersecting boxes before rendering (report tidiness only).
    pub merge_overlapping: bool,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            mode: RedactionMode::Fill,
            fill_color: [0, 0, 0],
            blur_kernel_size: 23,
            blur_sigma: 11.0,
            pad: 0,
            merge_overlapping: false,
        }
    }
}

impl RedactionConfig {
    /// Kernel size forced odd and at least [`MIN_BLUR_KERNEL`].
    pub fn effective_kernel_size(&self) -> u32 {
        let size = self.blur_kernel_size.max(MIN_BLUR_KERNEL);
        if size % 2 == 0 { size + 1 } else { size }
    }
}

/// Paints redactions over fused regions.
pub struct RedactionRenderer;

impl RedactionRenderer {
    /// Returns the redacted copy of `image` and whether anything was painted.
    ///
    /// Regions are expected to be clipped already; anything still outside the
    /// image is clipped again rather than painted. The input is never
    /// modified and the output always has the input's dimensions.
    pub fn render(
        image: &RgbImage,
        regions: &[Region],
        config: &RedactionConfig,
    ) -> (RgbImage, bool) {
        let mut output = image.clone();
        if regions.is_empty() {
            return (output, false);
        }

        let (width, height) = image.dimensions();
        match config.mode {
            RedactionMode::Fill => {
                let color = image::Rgb(config.fill_color);
                for region in regions {
                    let bbox = region.bbox.clip(width, height);
                    if bbox.is_degenerate() {
                        continue;
                    }
                    let rect = Rect::at(bbox.min.x, bbox.min.y)
                        .of_size(bbox.width() as u32, bbox.height() as u32);
                    draw_filled_rect_mut(&mut output, rect, color);
                }
            }
            RedactionMode::Blur => {
                // Blur the whole frame once so strength does not depend on box size
                let kernel = gaussian_kernel(config.effective_kernel_size(), config.blur_sigma);
                let blurred = separable_filter_equal(image, &kernel);
                for region in regions {
                    let bbox = region.bbox.clip(width, height);
                    if bbox.is_degenerate() {
                        continue;
                    }
                    let patch = imageops::crop_imm(
                        &blurred,
                        bbox.min.x as u32,
                        bbox.min.y as u32,
                        bbox.width() as u32,
                        bbox.height() as u32,
                    )
                    .to_image();
                    imageops::replace(&mut output, &patch, bbox.min.x as i64, bbox.min.y as i64);
                }
            }
        }

        debug!(regions = regions.len(), mode = ?config.mode, "Rendered redactions");
        (output, true)
    }
}

/// Normalized 1-D Gaussian kernel.
///
/// A non-positive sigma is derived from the size the way OpenCV does.
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let size = size.max(1) as i32;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = size / 2;
    let weights: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{bbox::Bbox, region::BoxSource};
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) * 3 % 256) as u8])
        })
    }

    fn region(x1: i32, y1: i32, x2: i32, y2: i32) -> Region {
        Region::new(Bbox::from_xyxy(x1, y1, x2, y2), "PERSON", Some(0.9), BoxSource::Recognizer)
    }

    #[test]
    fn test_empty_regions_is_untouched_copy() {
        let image = gradient(32, 24);
        for mode in [RedactionMode::Fill, RedactionMode::Blur] {
            let config = RedactionConfig {
                mode,
                ..Default::default()
            };
            let (output, applied) = RedactionRenderer::render(&image, &[], &config);
            assert!(!applied);
            assert_eq!(output, image);
        }
    }

    #[test]
    fn test_fill_paints_only_inside() {
        let image = gradient(40, 40);
        let config = RedactionConfigBuilder::default()
            .fill_color([255, 0, 0])
            .build()
            .unwrap();
        let (output, applied) = RedactionRenderer::render(&image, &[region(5, 5, 15, 10)], &config);

        assert!(applied);
        assert_eq!(output.dimensions(), image.dimensions());
        for (x, y, pixel) in output.enumerate_pixels() {
            let inside = (5..15).contains(&x) && (5..10).contains(&y);
            if inside {
                assert_eq!(*pixel, Rgb([255, 0, 0]));
            } else {
                assert_eq!(pixel, image.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_fill_is_idempotent() {
        let image = gradient(50, 30);
        let regions = [region(2, 2, 20, 12), region(10, 8, 40, 25)];
        let config = RedactionConfig::default();

        let (once, _) = RedactionRenderer::render(&image, &regions, &config);
        let (twice, applied) = RedactionRenderer::render(&once, &regions, &config);
        assert!(applied);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_out_of_bounds_region_never_paints_outside() {
        let image = gradient(20, 20);
        let regions = [region(-10, -10, 50, 5)];
        let (output, applied) =
            RedactionRenderer::render(&image, &regions, &RedactionConfig::default());
        assert!(applied);
        assert_eq!(output.dimensions(), (20, 20));
        // Rows below the clipped box are untouched
        for x in 0..20 {
            assert_eq!(output.get_pixel(x, 10), image.get_pixel(x, 10));
        }
    }

    #[test]
    fn test_blur_changes_only_inside() {
        let image = gradient(60, 60);
        let config = RedactionConfig {
            mode: RedactionMode::Blur,
            blur_kernel_size: 4,
            blur_sigma: 3.0,
            ..Default::default()
        };
        let (output, applied) =
            RedactionRenderer::render(&image, &[region(10, 10, 30, 30)], &config);
        assert!(applied);

        let mut changed = 0;
        for (x, y, pixel) in output.enumerate_pixels() {
            let inside = (10..30).contains(&x) && (10..30).contains(&y);
            if !inside {
                assert_eq!(pixel, image.get_pixel(x, y));
            } else if pixel != image.get_pixel(x, y) {
                changed += 1;
            }
        }
        assert!(changed > 0);
    }

    #[test]
    fn test_kernel_size_forced_odd() {
        let mut config = RedactionConfig::default();
        config.blur_kernel_size = 4;
        assert_eq!(config.effective_kernel_size(), 5);
        config.blur_kernel_size = 22;
        assert_eq!(config.effective_kernel_size(), 23);
        config.blur_kernel_size = 9;
        assert_eq!(config.effective_kernel_size(), 9);
    }

    #[test]
    fn test_gaussian_kernel_normalized() {
        let kernel = gaussian_kernel(7, 0.0);
        assert_eq!(kernel.len(), 7);
        assert!((kernel.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(kernel[3] > kernel[2] && kernel[2] > kernel[1]);
        assert!((kernel[0] - kernel[6]).abs() < 1e-7);
    }
}
