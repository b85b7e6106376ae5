//! OCR engines producing [`Word`]s with pixel boxes.

pub mod tesseract;

use std::path::Path;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::warn;

use crate::{
    error::{IoSnafu, RedactError},
    text::Word,
};

pub use tesseract::{TesseractCli, parse_tsv};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Words scored `0 <= conf < min_confidence` are dropped; unscored words stay.
    pub min_confidence: i32,
    /// `tesseract` binary to run when no word sidecar is given.
    pub tesseract_cmd: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            min_confidence: 50,
            tesseract_cmd: None,
        }
    }
}

pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn extract_words(&self, image: &RgbImage) -> Result<Vec<Word>, RedactError>;
}

/// Precomputed words, returned for every image.
#[derive(Debug, Clone, Default)]
pub struct StaticWords {
    words: Vec<Word>,
}

impl StaticWords {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    /// Words from a Tesseract TSV dump.
    pub fn from_tsv(tsv: &str, min_confidence: i32) -> Result<Self, RedactError> {
        Ok(Self::new(parse_tsv(tsv, min_confidence)?))
    }
}

impl OcrEngine for StaticWords {
    fn name(&self) -> &str {
        "static"
    }

    fn extract_words(&self, _image: &RgbImage) -> Result<Vec<Word>, RedactError> {
        Ok(self.words.clone())
    }
}

/// Picks the OCR source for one image: a `<stem>.tsv` sidecar next to it,
/// then the configured `tesseract` binary, else no words.
pub fn engine_for_image(
    image_path: &Path,
    config: &OcrConfig,
) -> Result<Box<dyn OcrEngine>, RedactError> {
    let sidecar = image_path.with_extension("tsv");
    if sidecar.is_file() {
        let tsv = std::fs::read_to_string(&sidecar).context(IoSnafu {
            path: sidecar.display().to_string(),
        })?;
        return Ok(Box::new(StaticWords::from_tsv(&tsv, config.min_confidence)?));
    }
    if let Some(command) = &config.tesseract_cmd {
        return Ok(Box::new(TesseractCli::new(command, config.min_confidence)));
    }
    warn!(
        image = %image_path.display(),
        "No OCR sidecar or tesseract command; text PII is skipped"
    );
    Ok(Box::new(StaticWords::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_for_image_prefers_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("car.jpg");
        std::fs::write(
            dir.path().join("car.tsv"),
            "5\t1\t1\t1\t1\t1\t10\t10\t80\t20\t95\tCONFIDENTIAL\n",
        )
        .unwrap();

        let config = OcrConfig {
            tesseract_cmd: Some("tesseract".into()),
            ..Default::default()
        };
        let engine = engine_for_image(&image, &config).unwrap();
        assert_eq!(engine.name(), "static");
        let words = engine.extract_words(&RgbImage::new(1, 1)).unwrap();
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].text, "CONFIDENTIAL");

        let other = engine_for_image(&dir.path().join("bus.png"), &config).unwrap();
        assert_eq!(other.name(), "tesseract");

        let none = engine_for_image(&dir.path().join("bus.png"), &OcrConfig::default()).unwrap();
        assert!(none.extract_words(&RgbImage::new(1, 1)).unwrap().is_empty());
    }
}
