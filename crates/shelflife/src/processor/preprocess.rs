use std::fmt;

use image::{DynamicImage, GenericImageView, GrayImage, Luma};
use imageproc::distance_transform::Norm;

use crate::error::ProcessError;

const MIN_FILE_BYTES: usize = 1_000;
const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;
const MIN_DIMENSION: u32 = 100;
const MAX_ASPECT_RATIO: f32 = 10.0;

/// Non-fatal observations about an uploaded receipt image.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageWarning {
    FileTooSmall { bytes: usize },
    FileTooLarge { bytes: usize },
    LowResolution { width: u32, height: u32 },
    UnusualAspectRatio { ratio: f32 },
}

impl fmt::Display for ImageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageWarning::FileTooSmall { bytes } => {
                write!(f, "image file is very small ({} bytes)", bytes)
            }
            ImageWarning::FileTooLarge { bytes } => {
                write!(f, "image file exceeds {} bytes ({} bytes)", MAX_FILE_BYTES, bytes)
            }
            ImageWarning::LowResolution { width, height } => {
                write!(f, "image resolution too low ({}x{})", width, height)
            }
            ImageWarning::UnusualAspectRatio { ratio } => {
                write!(f, "unusual aspect ratio ({:.1})", ratio)
            }
        }
    }
}

/// Binarized image ready for OCR, plus whatever the validator noticed.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub bitmap: GrayImage,
    pub warnings: Vec<ImageWarning>,
}

/// Turns an encoded receipt photo into a clean black-on-white bitmap.
///
/// Stages: grayscale, median denoise, local-mean adaptive threshold, then a
/// one-pixel dilation of the ink to close broken glyph strokes.
#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    median_radius: u32,
    block_radius: u32,
    threshold_offset: u8,
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self {
            median_radius: 1,
            block_radius: 5,
            threshold_offset: 2,
        }
    }
}

impl ImagePreprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preprocess(&self, bytes: &[u8]) -> Result<PreparedImage, ProcessError> {
        let _span = tracing::info_span!("processor.preprocess", bytes = bytes.len()).entered();

        let image = decode(bytes)?;
        let warnings = validate(bytes.len(), &image);
        for warning in &warnings {
            tracing::warn!(%warning, "Receipt image quality warning");
        }

        Ok(PreparedImage {
            bitmap: self.binarize(&image),
            warnings,
        })
    }

    pub fn binarize(&self, image: &DynamicImage) -> GrayImage {
        let gray = image.to_luma8();
        if gray.width() == 0 || gray.height() == 0 {
            return gray;
        }

        let denoised =
            imageproc::filter::median_filter(&gray, self.median_radius, self.median_radius);
        let binary = adaptive_threshold(&denoised, self.block_radius, self.threshold_offset);
        dilate_ink(binary)
    }
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ProcessError> {
    if bytes.is_empty() {
        return Err(ProcessError::Decode("image is empty".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| ProcessError::Decode(e.to_string()))
}

/// Checks size, resolution and shape of a decoded image. Never fails.
pub fn validate(file_bytes: usize, image: &DynamicImage) -> Vec<ImageWarning> {
    let mut warnings = Vec::new();

    if file_bytes < MIN_FILE_BYTES {
        warnings.push(ImageWarning::FileTooSmall { bytes: file_bytes });
    }
    if file_bytes > MAX_FILE_BYTES {
        warnings.push(ImageWarning::FileTooLarge { bytes: file_bytes });
    }

    let (width, height) = image.dimensions();
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        warnings.push(ImageWarning::LowResolution { width, height });
    }

    let short = width.min(height).max(1) as f32;
    let ratio = width.max(height) as f32 / short;
    if ratio > MAX_ASPECT_RATIO {
        warnings.push(ImageWarning::UnusualAspectRatio { ratio });
    }

    warnings
}

/// Pixel becomes white when brighter than its neighbourhood mean minus
/// `offset`, black otherwise. Neighbourhood is a square of side
/// `2 * block_radius + 1`, clipped at the borders.
fn adaptive_threshold(image: &GrayImage, block_radius: u32, offset: u8) -> GrayImage {
    let (width, height) = image.dimensions();
    let (w, h) = (width as usize, height as usize);
    let stride = w + 1;

    let mut integral = vec![0u64; stride * (h + 1)];
    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += u64::from(image.get_pixel(x as u32, y as u32)[0]);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let r = block_radius as usize;
    let mut out = GrayImage::new(width, height);
    for y in 0..h {
        let y0 = y.saturating_sub(r);
        let y1 = (y + r + 1).min(h);
        for x in 0..w {
            let x0 = x.saturating_sub(r);
            let x1 = (x + r + 1).min(w);

            let sum = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
            let count = ((x1 - x0) * (y1 - y0)) as u64;
            let threshold = (sum / count) as i64 - i64::from(offset);

            let pixel = i64::from(image.get_pixel(x as u32, y as u32)[0]);
            let value = if pixel > threshold { 255 } else { 0 };
            out.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }
    out
}

/// Grows dark strokes by one pixel.
fn dilate_ink(mut binary: GrayImage) -> GrayImage {
    image::imageops::invert(&mut binary);
    let mut grown = imageproc::morphology::dilate(&binary, Norm::LInf, 1);
    image::imageops::invert(&mut grown);
    grown
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn white(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    fn encode(image: &GrayImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_undecodable_bytes_fail_with_decode_error() {
        let result = ImagePreprocessor::new().preprocess(b"definitely not an image");
        assert!(matches!(result, Err(ProcessError::Decode(_))));
    }

    #[test]
    fn test_empty_bytes_fail_with_decode_error() {
        let result = ImagePreprocessor::new().preprocess(&[]);
        assert!(matches!(result, Err(ProcessError::Decode(_))));
    }

    #[test]
    fn test_output_is_binary_and_same_size() {
        let mut img = white(160, 120);
        for x in 20..140 {
            for y in 50..53 {
                img.put_pixel(x, y, Luma([30]));
            }
        }
        let prepared = ImagePreprocessor::new().preprocess(&encode(&img)).unwrap();

        assert_eq!(prepared.bitmap.dimensions(), (160, 120));
        assert!(prepared.bitmap.pixels().all(|p| p[0] == 0 || p[0] == 255));
    }

    #[test]
    fn test_thin_stroke_survives_and_is_dilated() {
        let mut img = white(160, 120);
        for x in 20..140 {
            for y in 50..53 {
                img.put_pixel(x, y, Luma([30]));
            }
        }
        let prepared = ImagePreprocessor::new().preprocess(&encode(&img)).unwrap();
        let bitmap = &prepared.bitmap;

        assert_eq!(bitmap.get_pixel(80, 51)[0], 0);
        // one pixel above the stroke is inked by dilation
        assert_eq!(bitmap.get_pixel(80, 49)[0], 0);
        assert_eq!(bitmap.get_pixel(80, 10)[0], 255);
    }

    #[test]
    fn test_isolated_speck_is_removed() {
        let mut img = white(120, 120);
        img.put_pixel(60, 60, Luma([0]));
        let prepared = ImagePreprocessor::new().preprocess(&encode(&img)).unwrap();

        assert!(prepared.bitmap.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_validate_flags_small_and_skinny_images() {
        let image = DynamicImage::ImageLuma8(white(40, 900));
        let warnings = validate(500, &image);

        assert!(warnings.contains(&ImageWarning::FileTooSmall { bytes: 500 }));
        assert!(warnings.contains(&ImageWarning::LowResolution {
            width: 40,
            height: 900
        }));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ImageWarning::UnusualAspectRatio { .. })));
    }

    #[test]
    fn test_validate_accepts_reasonable_image() {
        let image = DynamicImage::ImageLuma8(white(600, 1200));
        assert!(validate(250_000, &image).is_empty());
    }

    #[test]
    fn test_validate_flags_oversized_file() {
        let image = DynamicImage::ImageLuma8(white(600, 800));
        let warnings = validate(MAX_FILE_BYTES + 1, &image);
        assert_eq!(
            warnings,
            vec![ImageWarning::FileTooLarge {
                bytes: MAX_FILE_BYTES + 1
            }]
        );
    }
}
