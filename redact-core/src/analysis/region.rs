use serde::{Deserialize, Serialize};

use super::bbox::Bbox;

/// Which signal produced a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxSource {
    /// Object detector (license plates).
    Detector,
    /// Word-level pattern matcher.
    Pattern,
    /// Text recognizers whose spans were mapped back through the text index.
    Recognizer,
}

impl BoxSource {
    pub const fn name(&self) -> &'static str {
        match self {
            BoxSource::Detector => "detector",
            BoxSource::Pattern => "pattern",
            BoxSource::Recognizer => "recognizer",
        }
    }
}

/// A labelled pixel box destined for redaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub bbox: Bbox,
    pub label: String,
    pub score: Option<f32>,
    pub source: BoxSource,
}

impl Region {
    pub fn new(
        bbox: Bbox,
        label: impl Into<String>,
        score: Option<f32>,
        source: BoxSource,
    ) -> Self {
        Self {
            bbox,
            label: label.into(),
            score,
            source,
        }
    }

    /// Returns a copy with a different box, keeping label, score and source.
    pub fn with_bbox(&self, bbox: Bbox) -> Self {
        Self {
            bbox,
            ..self.clone()
        }
    }
}
