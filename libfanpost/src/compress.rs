//! Adaptive image compression
//!
//! Shrinks a PNG or JPEG until its encoded size fits a byte budget. Each pass
//! re-encodes the source at a smaller scale (and, for JPEG, lower quality).
//! The loop stops as soon as the output fits, or once quality sits at its
//! floor *and* one side has dropped below the minimum dimension. Both floors
//! are always reached because every pass strictly shrinks the scale, so the
//! loop terminates even for budgets that can never be met.
//!
//! Everything here works on in-memory bytes; there is no file or network I/O.

use std::borrow::Cow;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::CompressionError;
use crate::types::ImageMimeType;

/// Default byte budget shared by every uploading adapter (976 KiB)
pub const DEFAULT_TARGET_BYTES: usize = 976 * 1024;

/// Size and quality limits for one compression run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionBudget {
    /// Maximum encoded size in bytes
    pub target_bytes: usize,
    /// JPEG quality of the first pass
    pub initial_quality: u8,
    /// JPEG quality never drops below this
    pub min_quality: u8,
    /// Quality lost per pass
    pub quality_step: u8,
    /// Scale multiplier applied per pass
    pub shrink_factor: f64,
    /// Side length (px) below which shrinking may stop once quality is at its floor
    pub min_dimension: u32,
}

impl Default for CompressionBudget {
    fn default() -> Self {
        Self {
            target_bytes: DEFAULT_TARGET_BYTES,
            initial_quality: 85,
            min_quality: 20,
            quality_step: 5,
            shrink_factor: 0.9,
            min_dimension: 200,
        }
    }
}

impl CompressionBudget {
    /// Budget with default limits and a custom byte target
    pub fn with_target(target_bytes: usize) -> Self {
        Self {
            target_bytes,
            ..Self::default()
        }
    }

    /// Check that the limits guarantee termination
    pub fn validate(&self) -> Result<(), CompressionError> {
        if !(self.shrink_factor > 0.0 && self.shrink_factor < 1.0) {
            return Err(CompressionError::InvalidBudget(format!(
                "shrink_factor must be between 0 and 1 (got {})",
                self.shrink_factor
            )));
        }
        if self.quality_step == 0 && self.initial_quality > self.min_quality {
            return Err(CompressionError::InvalidBudget(
                "quality_step must be positive".to_string(),
            ));
        }
        if self.min_quality == 0 || self.initial_quality > 100 {
            return Err(CompressionError::InvalidBudget(format!(
                "quality must lie in 1..=100 (got {}..={})",
                self.min_quality, self.initial_quality
            )));
        }
        if self.min_quality > self.initial_quality {
            return Err(CompressionError::InvalidBudget(format!(
                "min_quality {} exceeds initial_quality {}",
                self.min_quality, self.initial_quality
            )));
        }
        // Sides never shrink below 1px, so the floor has to sit above that.
        if self.min_dimension < 2 {
            return Err(CompressionError::InvalidBudget(format!(
                "min_dimension must be at least 2 (got {})",
                self.min_dimension
            )));
        }
        Ok(())
    }
}

/// Output of [`compress`]
#[derive(Clone, PartialEq, Eq)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    /// Dimensions of the encoded image
    pub width: u32,
    pub height: u32,
    /// Quality used for the final pass (ignored by the PNG encoder)
    pub quality: u8,
    /// Number of encode passes performed
    pub iterations: u32,
}

impl CompressedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for CompressedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedImage")
            .field("len", &self.bytes.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("quality", &self.quality)
            .field("iterations", &self.iterations)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    fn from_mime(declared_mime: &str) -> Result<Self, CompressionError> {
        match ImageMimeType::from_mime_str(declared_mime) {
            Some(ImageMimeType::Jpeg) => Ok(Self::Jpeg),
            Some(ImageMimeType::Png) => Ok(Self::Png),
            _ => Err(CompressionError::UnsupportedFormat(declared_mime.to_string())),
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
        }
    }
}

/// Compress `bytes` until the encoded size fits `budget`
///
/// `declared_mime` selects both the decoder and the output encoder; only
/// `image/png`, `image/jpeg` and `image/jpg` are accepted.
///
/// # Errors
///
/// - [`CompressionError::UnsupportedFormat`] for any other MIME type
/// - [`CompressionError::Decode`] if the bytes are not a valid image of that type
/// - [`CompressionError::InvalidBudget`] if the budget could loop forever
pub fn compress(
    bytes: &[u8],
    declared_mime: &str,
    budget: &CompressionBudget,
) -> Result<CompressedImage, CompressionError> {
    let format = OutputFormat::from_mime(declared_mime)?;
    budget.validate()?;

    let decoded = image::load_from_memory_with_format(bytes, format.image_format())
        .map_err(CompressionError::Decode)?;
    let source = normalize_color(decoded);
    let (source_width, source_height) = (source.width(), source.height());

    let mut quality = budget.initial_quality;
    let mut scale = 1.0_f64;
    let mut iterations = 0_u32;

    loop {
        iterations += 1;

        let width = scaled(source_width, scale);
        let height = scaled(source_height, scale);
        let frame = if width == source_width && height == source_height {
            Cow::Borrowed(&source)
        } else {
            Cow::Owned(source.resize_exact(width, height, FilterType::Lanczos3))
        };

        let encoded = encode(&frame, format, quality)?;

        let fits = encoded.len() <= budget.target_bytes;
        let exhausted = quality <= budget.min_quality
            && (width < budget.min_dimension || height < budget.min_dimension);

        if fits || exhausted {
            debug!(
                source_bytes = bytes.len(),
                output_bytes = encoded.len(),
                width,
                height,
                quality,
                iterations,
                fits,
                "image compression finished"
            );
            return Ok(CompressedImage {
                bytes: encoded,
                width,
                height,
                quality,
                iterations,
            });
        }

        scale *= budget.shrink_factor;
        quality = quality
            .saturating_sub(budget.quality_step)
            .max(budget.min_quality);
    }
}

/// Drop alpha and exotic pixel layouts; JPEG only takes 8-bit grey or RGB
fn normalize_color(image: DynamicImage) -> DynamicImage {
    match image.color() {
        ColorType::L8 | ColorType::Rgb8 => image,
        _ => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled(dimension: u32, scale: f64) -> u32 {
    ((f64::from(dimension) * scale) as u32).max(1)
}

fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, CompressionError> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Jpeg => image
            .write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, quality))
            .map_err(CompressionError::Encode)?,
        OutputFormat::Png => image
            .write_with_encoder(PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Best,
                PngFilter::Adaptive,
            ))
            .map_err(CompressionError::Encode)?,
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    /// Deterministic noise; compresses badly, which is what these tests need
    fn noise(width: u32, height: u32) -> DynamicImage {
        let mut state = 0x1234_5678_u32;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            let b = state.to_be_bytes();
            Rgb([b[0], b[1], b[2]])
        }))
    }

    fn encoded(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        image.write_to(&mut cursor, format).unwrap();
        cursor.into_inner()
    }

    fn assert_budget_invariant(output: &CompressedImage, budget: &CompressionBudget) {
        let fits = output.len() <= budget.target_bytes;
        let exhausted = output.quality == budget.min_quality
            && (output.width < budget.min_dimension || output.height < budget.min_dimension);
        assert!(
            fits || exhausted,
            "output {:?} violates budget {:?}",
            output,
            budget
        );
    }

    #[test]
    fn test_compliant_image_passes_through_in_one_iteration() {
        let source = encoded(&noise(64, 48), ImageFormat::Jpeg);
        let budget = CompressionBudget::default();

        let output = compress(&source, "image/jpeg", &budget).unwrap();

        assert_eq!(output.iterations, 1);
        assert_eq!((output.width, output.height), (64, 48));
        assert_eq!(output.quality, 85);
        assert!(output.len() <= budget.target_bytes);
    }

    #[test]
    fn test_png_shrinks_until_it_fits() {
        let source = encoded(&noise(400, 400), ImageFormat::Png);
        let budget = CompressionBudget::with_target(60_000);
        assert!(source.len() > budget.target_bytes);

        let output = compress(&source, "image/png", &budget).unwrap();

        assert!(output.iterations > 1);
        assert!(output.width < 400 && output.height < 400);
        assert_budget_invariant(&output, &budget);

        let decoded = image::load_from_memory_with_format(&output.bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (output.width, output.height));
    }

    #[test]
    fn test_jpeg_lowers_quality_while_shrinking() {
        let source = encoded(&noise(400, 300), ImageFormat::Jpeg);
        let budget = CompressionBudget::with_target(20_000);

        let output = compress(&source, "image/jpeg", &budget).unwrap();

        assert!(output.quality < 85);
        assert_budget_invariant(&output, &budget);
    }

    #[test]
    fn test_unreachable_budget_stops_at_both_floors() {
        let source = encoded(&noise(300, 300), ImageFormat::Jpeg);
        let budget = CompressionBudget::with_target(10);

        let output = compress(&source, "image/jpeg", &budget).unwrap();

        assert!(output.len() > budget.target_bytes);
        assert_eq!(output.quality, budget.min_quality);
        assert!(output.width < 200 || output.height < 200);
    }

    #[test]
    fn test_tiny_image_with_unreachable_budget_terminates() {
        let source = encoded(&noise(2, 2), ImageFormat::Png);
        let budget = CompressionBudget::with_target(1);

        let output = compress(&source, "image/png", &budget).unwrap();

        assert_eq!(output.quality, budget.min_quality);
        assert!(output.width >= 1 && output.height >= 1);
    }

    #[test]
    fn test_recompressing_compliant_output_stays_within_budget() {
        let source = encoded(&noise(320, 240), ImageFormat::Jpeg);
        let budget = CompressionBudget::with_target(25_000);

        let first = compress(&source, "image/jpeg", &budget).unwrap();
        assert!(first.len() <= budget.target_bytes);

        let second = compress(&first.bytes, "image/jpeg", &budget).unwrap();
        assert!(second.len() <= budget.target_bytes);
    }

    #[test]
    fn test_output_is_deterministic() {
        let source = encoded(&noise(256, 256), ImageFormat::Png);
        let budget = CompressionBudget::with_target(40_000);

        let a = compress(&source, "image/png", &budget).unwrap();
        let b = compress(&source, "image/png", &budget).unwrap();

        assert_eq!(a, b);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([10, 20, 30, 128])));
        let source = encoded(&rgba, ImageFormat::Png);

        let output = compress(&source, "image/png", &CompressionBudget::default()).unwrap();

        let decoded = image::load_from_memory_with_format(&output.bytes, ImageFormat::Png).unwrap();
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn test_jpg_alias_and_case_are_accepted() {
        let source = encoded(&noise(16, 16), ImageFormat::Jpeg);
        assert!(compress(&source, "image/jpg", &CompressionBudget::default()).is_ok());
        assert!(compress(&source, "IMAGE/JPEG", &CompressionBudget::default()).is_ok());
    }

    #[test]
    fn test_unsupported_format_is_rejected() {
        for mime in ["image/gif", "image/webp", "video/mp4", ""] {
            let result = compress(&[0, 1, 2], mime, &CompressionBudget::default());
            assert!(
                matches!(result, Err(CompressionError::UnsupportedFormat(_))),
                "{mime} should be unsupported"
            );
        }
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = compress(b"not an image", "image/png", &CompressionBudget::default());
        assert!(matches!(result, Err(CompressionError::Decode(_))));
    }

    #[test]
    fn test_budget_validation() {
        assert!(CompressionBudget::default().validate().is_ok());

        let bad_shrink = CompressionBudget {
            shrink_factor: 1.0,
            ..CompressionBudget::default()
        };
        assert!(bad_shrink.validate().is_err());

        let bad_dimension = CompressionBudget {
            min_dimension: 1,
            ..CompressionBudget::default()
        };
        assert!(bad_dimension.validate().is_err());

        let bad_step = CompressionBudget {
            quality_step: 0,
            ..CompressionBudget::default()
        };
        assert!(bad_step.validate().is_err());

        let inverted = CompressionBudget {
            min_quality: 90,
            ..CompressionBudget::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_default_budget_values() {
        let budget = CompressionBudget::default();
        assert_eq!(budget.target_bytes, 999_424);
        assert_eq!(budget.initial_quality, 85);
        assert_eq!(budget.min_quality, 20);
        assert_eq!(budget.min_dimension, 200);
        assert!((budget.shrink_factor - 0.9).abs() < f64::EPSILON);
    }
}
