use std::{collections::BTreeMap, path::Path};

use serde::Serialize;
use snafu::ResultExt;
use uuid::Uuid;

use crate::{
    analysis::region::{BoxSource, Region},
    error::{IoSnafu, RedactError, ReportSnafu},
    recognizer::RecognizerOutcome,
    text::EntitySpan,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Engines {
    pub detector: Option<String>,
    pub ocr: String,
    pub recognizers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Counts {
    /// Fused boxes per source (`detector`, `pattern`, `recognizer`).
    pub by_source: BTreeMap<String, usize>,
    pub license_plates: usize,
    pub pii: usize,
    pub total: usize,
}

impl Counts {
    pub fn from_regions(regions: &[Region]) -> Self {
        let mut counts = Counts {
            total: regions.len(),
            ..Default::default()
        };
        for region in regions {
            *counts
                .by_source
                .entry(region.source.name().to_string())
                .or_default() += 1;
            match region.source {
                BoxSource::Detector => counts.license_plates += 1,
                BoxSource::Pattern | BoxSource::Recognizer => counts.pii += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Redactions {
    pub applied: bool,
    pub boxes_xyxy: Vec<[i32; 4]>,
    pub labels: Vec<String>,
    pub redacted_image_path: Option<String>,
}

/// What was found in one image and what was painted over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub id: Uuid,
    pub source_image: Option<String>,
    pub engines: Engines,
    pub counts: Counts,
    pub spans: Vec<EntitySpan>,
    pub recognizers: Vec<RecognizerOutcome>,
    pub redactions: Redactions,
}

impl Report {
    pub fn new(
        engines: Engines,
        regions: &[Region],
        spans: Vec<EntitySpan>,
        recognizers: Vec<RecognizerOutcome>,
        applied: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_image: None,
            engines,
            counts: Counts::from_regions(regions),
            spans,
            recognizers,
            redactions: Redactions {
                applied,
                boxes_xyxy: regions.iter().map(|r| r.bbox.xyxy()).collect(),
                labels: regions.iter().map(|r| r.label.clone()).collect(),
                redacted_image_path: None,
            },
        }
    }
}

/// Written in place of a [`Report`] when an image could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorReport {
    pub source_image: String,
    pub stage: Option<String>,
    pub error: String,
}

impl ErrorReport {
    pub fn new(source_image: impl Into<String>, err: &RedactError) -> Self {
        Self {
            source_image: source_image.into(),
            stage: err.stage().map(str::to_string),
            error: err.to_string(),
        }
    }
}

/// Pretty-printed JSON written to `path`.
pub fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), RedactError> {
    let json = serde_json::to_string_pretty(value).context(ReportSnafu)?;
    std::fs::write(path, json).context(IoSnafu {
        path: path.display().to_string(),
    })
}
