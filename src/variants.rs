//! # Preprocessing Variant Generator
//!
//! This module produces a small fixed set of alternate renderings of the
//! input image, each intended to make text legible to recognition engines
//! under different noise and contrast conditions. Every transform is pure
//! (same input, same output) and derives independently from the grayscale
//! identity rendering.
//!
//! Failure policy: a transform that fails on a degenerate image is logged
//! and skipped; only a source image that cannot even produce the identity
//! variant fails the whole pipeline.

use anyhow::Result;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::adaptive_threshold;
use imageproc::filter::{gaussian_blur_f32, median_filter};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{PipelineConfig, PreprocessConfig};
use crate::errors::{PipelineError, PipelineResult};

/// Identifies one preprocessing transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantKind {
    /// Grayscale conversion of the original image
    Identity,
    /// Gaussian-blurred (suppresses high-frequency noise)
    Blurred,
    /// Adaptive local-mean binarization
    Thresholded,
    /// Morphologically closed binarization (fills small stroke gaps)
    MorphClosed,
    /// CLAHE local contrast enhancement
    ContrastEnhanced,
    /// Median-filtered (salt-and-pepper noise removal)
    Denoised,
}

impl VariantKind {
    /// All variants in generation order. Identity always comes first so the
    /// `max_variants` cap can never remove it.
    pub const ALL: [VariantKind; 6] = [
        VariantKind::Identity,
        VariantKind::Blurred,
        VariantKind::Thresholded,
        VariantKind::MorphClosed,
        VariantKind::ContrastEnhanced,
        VariantKind::Denoised,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VariantKind::Identity => "identity",
            VariantKind::Blurred => "blurred",
            VariantKind::Thresholded => "thresholded",
            VariantKind::MorphClosed => "morph_closed",
            VariantKind::ContrastEnhanced => "contrast_enhanced",
            VariantKind::Denoised => "denoised",
        }
    }
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One preprocessed rendering of the source image.
///
/// Immutable once produced; owned by the pipeline run that created it and
/// dropped after all recognizers have consumed it.
#[derive(Debug, Clone)]
pub struct Variant {
    pub kind: VariantKind,
    pub image: DynamicImage,
}

/// Generate preprocessing variants for the given source image.
///
/// Produces up to `config.max_variants` variants in the order of
/// [`VariantKind::ALL`]. Transform failures are logged at WARN and skipped.
///
/// # Errors
///
/// Returns [`PipelineError::UnreadableImage`] if the source image is
/// degenerate (zero-sized) and the identity variant cannot be produced.
pub fn generate_variants(
    image: &DynamicImage,
    config: &PipelineConfig,
) -> PipelineResult<Vec<Variant>> {
    let gray = image.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(PipelineError::UnreadableImage(format!(
            "source image has degenerate dimensions {}x{}",
            gray.width(),
            gray.height()
        )));
    }

    let mut variants = Vec::with_capacity(config.max_variants);
    variants.push(Variant {
        kind: VariantKind::Identity,
        image: DynamicImage::ImageLuma8(gray.clone()),
    });

    for kind in VariantKind::ALL.into_iter().skip(1) {
        if variants.len() >= config.max_variants {
            break;
        }
        match apply_transform(kind, &gray, &config.preprocess) {
            Ok(transformed) => {
                debug!(
                    variant = kind.as_str(),
                    width = transformed.width(),
                    height = transformed.height(),
                    "Generated preprocessing variant"
                );
                variants.push(Variant {
                    kind,
                    image: DynamicImage::ImageLuma8(transformed),
                });
            }
            Err(e) => {
                warn!(
                    variant = kind.as_str(),
                    error = %e,
                    "Skipping preprocessing variant"
                );
            }
        }
    }

    Ok(variants)
}

fn apply_transform(
    kind: VariantKind,
    gray: &GrayImage,
    config: &PreprocessConfig,
) -> Result<GrayImage> {
    match kind {
        VariantKind::Identity => Ok(gray.clone()),
        VariantKind::Blurred => Ok(gaussian_blur_f32(gray, config.blur_sigma)),
        VariantKind::Thresholded => binarize(gray, config.adaptive_block_radius),
        VariantKind::MorphClosed => {
            let binary = binarize(gray, config.adaptive_block_radius)?;
            require_min_dimensions(&binary, 3, "morphological close")?;
            // Closing: dilation followed by erosion
            Ok(erode3x3(&dilate3x3(&binary)))
        }
        VariantKind::ContrastEnhanced => {
            apply_clahe(gray, config.clahe_clip_limit, config.clahe_tile_size)
        }
        VariantKind::Denoised => {
            let window = 2 * config.median_radius + 1;
            require_min_dimensions(gray, window, "median filter")?;
            Ok(median_filter(gray, config.median_radius, config.median_radius))
        }
    }
}

fn binarize(gray: &GrayImage, block_radius: u32) -> Result<GrayImage> {
    require_min_dimensions(gray, 2, "adaptive threshold")?;
    Ok(adaptive_threshold(gray, block_radius))
}

fn require_min_dimensions(image: &GrayImage, min: u32, transform: &str) -> Result<()> {
    if image.width() < min || image.height() < min {
        anyhow::bail!(
            "image {}x{} too small for {} (minimum {}x{})",
            image.width(),
            image.height(),
            transform,
            min,
            min
        );
    }
    Ok(())
}

/// 3x3 dilation (max filter). Expands bright regions; on binarized text this
/// can bridge small gaps in strokes.
fn dilate3x3(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut result = image.clone();

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut max_val = 0u8;
            for ky in -1i32..=1 {
                for kx in -1i32..=1 {
                    let nx = (x as i32 + kx) as u32;
                    let ny = (y as i32 + ky) as u32;
                    max_val = max_val.max(image.get_pixel(nx, ny)[0]);
                }
            }
            result.put_pixel(x, y, Luma([max_val]));
        }
    }

    result
}

/// 3x3 erosion (min filter). Shrinks bright regions back after dilation,
/// leaving filled gaps in place.
fn erode3x3(image: &GrayImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut result = image.clone();

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut min_val = 255u8;
            for ky in -1i32..=1 {
                for kx in -1i32..=1 {
                    let nx = (x as i32 + kx) as u32;
                    let ny = (y as i32 + ky) as u32;
                    min_val = min_val.min(image.get_pixel(nx, ny)[0]);
                }
            }
            result.put_pixel(x, y, Luma([min_val]));
        }
    }

    result
}

/// Contrast Limited Adaptive Histogram Equalization.
///
/// Equalizes the histogram of each tile independently with a clip limit that
/// prevents noise amplification, which recovers text printed over low
/// contrast or unevenly lit backgrounds.
fn apply_clahe(gray: &GrayImage, clip_limit: f32, tile_size: (u32, u32)) -> Result<GrayImage> {
    let (width, height) = gray.dimensions();

    // Tile size is capped by the image itself
    let tile_width = tile_size.0.min(width);
    let tile_height = tile_size.1.min(height);
    let tiles_x = width.div_ceil(tile_width);
    let tiles_y = height.div_ceil(tile_height);

    let mut output = GrayImage::new(width, height);

    for tile_y in 0..tiles_y {
        for tile_x in 0..tiles_x {
            let start_x = tile_x * tile_width;
            let start_y = tile_y * tile_height;
            let end_x = (start_x + tile_width).min(width);
            let end_y = (start_y + tile_height).min(height);

            let mapping = clahe_tile_mapping(gray, start_x, start_y, end_x, end_y, clip_limit);
            for y in start_y..end_y {
                for x in start_x..end_x {
                    let intensity = gray.get_pixel(x, y)[0] as usize;
                    output.put_pixel(x, y, Luma([mapping[intensity]]));
                }
            }
        }
    }

    Ok(output)
}

/// Equalization lookup table for one tile: clipped histogram, redistributed
/// excess, cumulative distribution scaled to 0..=255.
fn clahe_tile_mapping(
    gray: &GrayImage,
    start_x: u32,
    start_y: u32,
    end_x: u32,
    end_y: u32,
    clip_limit: f32,
) -> [u8; 256] {
    let total_pixels = ((end_x - start_x) * (end_y - start_y)) as f32;

    let mut histogram = [0u32; 256];
    for y in start_y..end_y {
        for x in start_x..end_x {
            histogram[gray.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    // Clip the histogram and collect the excess
    let clip_limit_pixels = (clip_limit * (total_pixels / 256.0)).round().max(1.0) as u32;
    let mut excess_pixels = 0u32;
    for count in &mut histogram {
        if *count > clip_limit_pixels {
            excess_pixels += *count - clip_limit_pixels;
            *count = clip_limit_pixels;
        }
    }

    // Redistribute excess pixels uniformly
    let uniform_increment = excess_pixels / 256;
    let mut remainder = excess_pixels % 256;
    for count in &mut histogram {
        *count += uniform_increment;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    // Cumulative distribution function scaled to intensity range
    let mut mapping = [0u8; 256];
    let mut cumulative = 0.0f32;
    for (intensity, count) in histogram.iter().enumerate() {
        cumulative += *count as f32 / total_pixels;
        mapping[intensity] = (cumulative.min(1.0) * 255.0).round() as u8;
    }

    mapping
}
