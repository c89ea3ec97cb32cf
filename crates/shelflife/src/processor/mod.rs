pub mod ocr;
pub mod preprocess;
#[cfg(feature = "tesseract")]
pub mod tesseract;

use std::path::Path;
use std::sync::Arc;

pub use ocr::{
    DisabledOcrEngine, Extraction, MockOcrEngine, OcrEngine, OcrOutput, OcrToken, TextExtractor,
};
pub use preprocess::{ImagePreprocessor, ImageWarning, PreparedImage};

use crate::error::ProcessError;

pub fn read_image(path: &Path) -> Result<Vec<u8>, ProcessError> {
    std::fs::read(path).map_err(|e| ProcessError::ReadImage {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Picks the OCR engine for the given settings. Without the `tesseract`
/// feature every receipt extracts to empty text.
pub fn build_engine(enabled: bool, languages: &[String]) -> Arc<dyn OcrEngine> {
    if !enabled {
        return Arc::new(DisabledOcrEngine);
    }

    #[cfg(feature = "tesseract")]
    {
        Arc::new(tesseract::TesseractEngine::new(languages))
    }

    #[cfg(not(feature = "tesseract"))]
    {
        let _ = languages;
        tracing::warn!("OCR enabled but the tesseract feature is not compiled in");
        Arc::new(DisabledOcrEngine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_image() {
        let result = read_image(Path::new("/nonexistent/receipt.jpg"));
        match result {
            Err(ProcessError::ReadImage { path, .. }) => {
                assert_eq!(path, Path::new("/nonexistent/receipt.jpg"));
            }
            other => panic!("expected ReadImage error, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_ocr_builds_disabled_engine() {
        let engine = build_engine(false, &["eng".to_string()]);
        assert_eq!(engine.name(), "disabled");
    }
}
