//! OCR boundary: image in, recognised text out.
//!
//! The text-recognition engine itself is an external collaborator. The
//! [`OcrEngine`] trait is the seam; the bundled [`TesseractOcr`] shells out
//! to the `tesseract` binary. Callers treat OCR failure as "this page is
//! non-informative" - the scorer downgrades it to `discarded` instead of
//! propagating an error.
//!
//! [`preprocess`] runs before recognition: multi-decade scans are faded,
//! skewed, and often typewritten, and a grayscale + unsharp-mask + binary
//! threshold pass measurably improves recognition on them.

use image::DynamicImage;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors from a text-recognition engine.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine could not be invoked: {0}")]
    EngineUnavailable(String),
    #[error("OCR engine failed: {0}")]
    RecognitionFailed(String),
    #[error("I/O error during OCR: {0}")]
    Io(#[from] std::io::Error),
}

/// A text-recognition engine: page image → raw text.
///
/// Implementations are synchronous; the pipeline calls them inside
/// `spawn_blocking`.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Normalise a scanned page image for recognition.
///
/// Grayscale, then an unsharp mask to recover edge contrast on faded type,
/// then a hard binary threshold so speckle and paper texture drop out.
pub fn preprocess(image: &DynamicImage) -> DynamicImage {
    let sharpened = image.grayscale().unsharpen(1.5, 2);
    let mut luma = sharpened.to_luma8();
    for px in luma.pixels_mut() {
        px.0[0] = if px.0[0] > 185 { 255 } else { 0 };
    }
    DynamicImage::ImageLuma8(luma)
}

/// OCR adapter that shells out to the `tesseract` CLI.
///
/// The page image is written to a scratch PNG, recognised with
/// `--oem 1 --psm 6` (LSTM engine, uniform-block segmentation - the right
/// mode for table pages), and the temp file is cleaned up on drop.
pub struct TesseractOcr {
    binary: PathBuf,
}

impl TesseractOcr {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
        }
    }

    /// Use a non-default tesseract binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new()
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let processed = preprocess(image);

        let dir = tempfile::tempdir()?;
        let png_path = dir.path().join("page.png");
        processed
            .save(&png_path)
            .map_err(|e| OcrError::RecognitionFailed(format!("scratch PNG write: {e}")))?;

        let output = Command::new(&self.binary)
            .arg(&png_path)
            .arg("stdout")
            .args(["--oem", "1", "--psm", "6"])
            .output()
            .map_err(|e| {
                OcrError::EngineUnavailable(format!("{}: {e}", self.binary.display()))
            })?;

        if !output.status.success() {
            return Err(OcrError::RecognitionFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract recognised {} bytes", text.len());
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba, RgbaImage};

    #[test]
    fn preprocess_binarises() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            8,
            8,
            Rgba([120, 120, 120, 255]),
        ));
        let out = preprocess(&img).to_luma8();
        for px in out.pixels() {
            assert!(px == &Luma([0u8]) || px == &Luma([255u8]));
        }
    }

    #[test]
    fn preprocess_is_deterministic() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_fn(16, 16, |x, y| {
            Rgba([(x * 16) as u8, (y * 16) as u8, 128, 255])
        }));
        let a = preprocess(&img).to_luma8();
        let b = preprocess(&img).to_luma8();
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn missing_binary_reports_engine_unavailable() {
        let ocr = TesseractOcr::with_binary("/definitely/not/a/real/tesseract");
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255])));
        let err = ocr.recognize(&img).unwrap_err();
        assert!(matches!(err, OcrError::EngineUnavailable(_)));
    }
}
