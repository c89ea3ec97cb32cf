use std::io::Cursor;
use std::sync::Arc;

use image::GrayImage;

use super::ocr::{parse_tsv, OcrEngine, OcrToken};
use crate::error::ProcessError;

/// Tesseract engine via leptess. Each call gets its own `LepTess` handle.
#[derive(Clone)]
pub struct TesseractEngine {
    inner: Arc<TesseractEngineInner>,
}

struct TesseractEngineInner {
    languages: String,
}

impl TesseractEngine {
    pub fn new(languages: &[String]) -> Self {
        let lang_str = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };

        Self {
            inner: Arc::new(TesseractEngineInner {
                languages: lang_str,
            }),
        }
    }

    pub fn languages(&self) -> &str {
        &self.inner.languages
    }
}

impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn recognize(&self, image: &GrayImage) -> Result<Vec<OcrToken>, ProcessError> {
        let mut png_data = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to encode bitmap: {}", e)))?;

        let mut lt = leptess::LepTess::new(None, &self.inner.languages).map_err(|e| {
            ProcessError::OcrFailed(format!("Failed to initialize Tesseract: {}", e))
        })?;

        lt.set_image_from_mem(&png_data)
            .map_err(|e| ProcessError::OcrFailed(format!("Failed to set image for OCR: {}", e)))?;

        let tsv = lt
            .get_tsv_text(0)
            .map_err(|e| ProcessError::OcrFailed(format!("OCR failed: {}", e)))?;

        Ok(parse_tsv(&tsv))
    }
}
