use serde::{Deserialize, Serialize};

use crate::analysis::bbox::Bbox;

/// A word recognized by the OCR engine.
///
/// `confidence` follows the Tesseract convention: `0..=100`, or `-1` when the
/// engine did not score the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub text: String,
    pub confidence: i32,
    pub bbox: Bbox,
}

impl Word {
    pub fn new(text: impl Into<String>, confidence: i32, bbox: Bbox) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox,
        }
    }

    /// Text with surrounding whitespace removed.
    pub fn trimmed(&self) -> &str {
        self.text.trim()
    }
}
