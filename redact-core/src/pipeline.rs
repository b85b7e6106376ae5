//! End-to-end redaction of one image, and of a directory of images.
//!
//! detector + OCR → text index → recognizers → span mapping + word patterns
//! → fusion → rendering → report.

use std::{
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{DynamicImage, RgbImage, codecs::jpeg::JpegEncoder};
use rayon::prelude::*;
use snafu::ResultExt;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    analysis::{fusion::BoxFusionEngine, mapper::SpanToRegionMapper, region::Region},
    config::{IoConfig, RedactorConfig},
    error::{ImageDecodeSnafu, ImageEncodeSnafu, IoSnafu, RedactError},
    inference::{
        model::session_builder,
        plate::{ObjectDetector, PlateModel, PlateSession},
    },
    ocr::OcrEngine,
    recognizer::{
        DenyListRecognizer, PatternRecognizer, PatternSet, RecognizerRegistry, SequenceTagger,
        WordPatternMatcher,
    },
    render::{RedactionConfig, RedactionRenderer},
    report::{Engines, ErrorReport, Report, write_json},
    text::{EntitySet, WordIndexer},
};

/// Extensions picked up in batch mode, compared case-insensitively.
pub const IMAGE_EXTENSIONS: [&str; 6] = ["jpg", "jpeg", "png", "bmp", "tiff", "webp"];

/// The redacted image with its report.
#[derive(Debug, Clone)]
pub struct RedactionOutput {
    pub image: RgbImage,
    pub report: Report,
}

/// Composes detection, recognition, fusion and rendering.
///
/// Immutable once built, so one instance serves concurrent images.
pub struct Redactor {
    detector: Option<Box<dyn ObjectDetector>>,
    registry: RecognizerRegistry,
    patterns: PatternSet,
    word_matcher: WordPatternMatcher,
    entities: EntitySet,
    redaction: RedactionConfig,
    jpeg_quality: u8,
}

impl Redactor {
    pub fn new(registry: RecognizerRegistry, entities: EntitySet) -> Self {
        Self {
            detector: None,
            registry,
            patterns: PatternSet::empty(),
            word_matcher: WordPatternMatcher::new(0.0),
            entities,
            redaction: RedactionConfig::default(),
            jpeg_quality: 90,
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn ObjectDetector>) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Patterns run over individual OCR words, keeping the word box as-is.
    pub fn with_word_patterns(mut self, patterns: PatternSet, min_score: f32) -> Self {
        self.patterns = patterns;
        self.word_matcher = WordPatternMatcher::new(min_score);
        self
    }

    pub fn with_redaction(mut self, redaction: RedactionConfig) -> Self {
        self.redaction = redaction;
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Builds every configured stage. Model load failures are fatal here.
    ///
    /// The plate detector and tagger are only loaded when a model path is
    /// configured; without one the stage is skipped with a warning.
    pub fn from_config(config: &RedactorConfig) -> Result<Self, RedactError> {
        let recognizers = &config.recognizers;
        let patterns = PatternSet::with_custom(&recognizers.patterns)?;

        let mut registry = RecognizerRegistry::new();
        registry.add(PatternRecognizer::new(patterns.clone(), recognizers.min_score));
        if !recognizers.deny_list.is_empty() {
            registry.add(DenyListRecognizer::new(
                &recognizers.deny_list_entity,
                &recognizers.deny_list,
            )?);
        }
        if config.tagger.enabled {
            if config.tagger.model_path.is_some() {
                let tagger =
                    SequenceTagger::shared(&config.tagger).map_err(|e| e.at_stage("tagger"))?;
                registry.add(tagger);
            } else {
                warn!("Sequence tagger enabled but no model path configured; skipping");
            }
        }

        let mut redactor = Self::new(registry, recognizers.entity_set())
            .with_word_patterns(patterns, recognizers.min_score)
            .with_redaction(config.redaction.clone())
            .with_jpeg_quality(config.io.jpeg_quality);

        match &config.plate.model_path {
            Some(path) => {
                let model = PlateModel::new(path, config.plate.clone());
                let session = PlateSession::new(session_builder()?, model)
                    .map_err(|e| e.at_stage("detector"))?;
                redactor = redactor.with_detector(Box::new(session));
            }
            None => warn!("No plate model configured; license plates are not detected"),
        }

        info!(recognizers = ?redactor.registry.names(), "Redactor ready");
        Ok(redactor)
    }

    /// Redacts one RGB8 image.
    ///
    /// Detector and OCR failures abort with their stage name; a failing
    /// recognizer only loses its own spans.
    pub fn process(
        &self,
        image: &DynamicImage,
        ocr: &dyn OcrEngine,
    ) -> Result<RedactionOutput, RedactError> {
        let DynamicImage::ImageRgb8(rgb) = image else {
            return Err(RedactError::InputShape {
                message: format!("expected 8-bit RGB, got {:?}", image.color()),
            }
            .at_stage("input"));
        };
        let (width, height) = rgb.dimensions();
        if width == 0 || height == 0 {
            return Err(RedactError::InputShape {
                message: format!("empty image {}x{}", width, height),
            }
            .at_stage("input"));
        }

        let span = info_span!("redact", width, height);
        let _guard = span.enter();

        let detector_regions = match &self.detector {
            Some(detector) => detector.detect(rgb).map_err(|e| e.at_stage("detector"))?,
            None => Vec::new(),
        };

        let words = ocr.extract_words(rgb).map_err(|e| e.at_stage("ocr"))?;
        let index = WordIndexer::build(&words);

        let analysis = self
            .registry
            .analyze_with_outcomes(&index.full_text, &self.entities);
        let recognizer_regions = SpanToRegionMapper::map_all(&analysis.spans, &index);

        let pattern_regions: Vec<Region> = self
            .word_matcher
            .find(&words, &self.patterns, &self.entities)
            .into_iter()
            .map(Region::from)
            .collect();

        let mut regions = BoxFusionEngine::fuse(
            &detector_regions,
            &pattern_regions,
            &recognizer_regions,
            width,
            height,
            self.redaction.pad,
        );
        if self.redaction.merge_overlapping {
            regions = BoxFusionEngine::merge_overlapping(&regions);
        }
        debug!(
            detector = detector_regions.len(),
            pattern = pattern_regions.len(),
            recognizer = recognizer_regions.len(),
            fused = regions.len(),
            "Regions"
        );

        let (redacted, applied) = RedactionRenderer::render(rgb, &regions, &self.redaction);

        let engines = Engines {
            detector: self.detector.as_ref().map(|d| d.name().to_string()),
            ocr: ocr.name().to_string(),
            recognizers: self.registry.names().into_iter().map(String::from).collect(),
        };
        let report = Report::new(engines, &regions, analysis.spans, analysis.outcomes, applied);
        info!(boxes = regions.len(), applied, "Redacted image");

        Ok(RedactionOutput {
            image: redacted,
            report,
        })
    }

    /// Decodes any supported format, redacts it and re-encodes it as JPEG.
    pub fn process_image_bytes(
        &self,
        raw: &[u8],
        ocr: &dyn OcrEngine,
    ) -> Result<(Vec<u8>, Report), RedactError> {
        let decoded = image::load_from_memory(raw)
            .context(ImageDecodeSnafu)
            .map_err(|e| e.at_stage("decode"))?;
        let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

        let output = self.process(&rgb, ocr)?;
        let jpeg = self.encode_jpeg(&output.image)?;
        Ok((jpeg, output.report))
    }

    fn encode_jpeg(&self, image: &RgbImage) -> Result<Vec<u8>, RedactError> {
        let mut buffer = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buffer, self.jpeg_quality)
            .encode_image(image)
            .context(ImageEncodeSnafu)
            .map_err(|e| e.at_stage("encode"))?;

        let bytes = buffer.into_inner();
        if bytes.is_empty() {
            return Err(RedactError::EmptyOutput {
                stage: "encode".to_string(),
            }
            .at_stage("encode"));
        }
        Ok(bytes)
    }

    /// Redacts every image in `io.input_dir` in parallel.
    ///
    /// Outputs are numbered from 1 in file-name order: `redacted_NNNN.jpg`
    /// and `report_NNNN.json`, or `report_NNNN_ERROR.json` for an image that
    /// failed. Returns the report paths in input order.
    pub fn run_batch<F>(&self, io: &IoConfig, ocr_for: F) -> Result<Vec<PathBuf>, RedactError>
    where
        F: Fn(&Path) -> Result<Box<dyn OcrEngine>, RedactError> + Sync,
    {
        let inputs = list_images(&io.input_dir)?;
        for dir in [&io.results_img_dir, &io.results_rpt_dir] {
            std::fs::create_dir_all(dir).context(IoSnafu {
                path: dir.display().to_string(),
            })?;
        }
        info!(images = inputs.len(), input = %io.input_dir.display(), "Starting batch");

        inputs
            .par_iter()
            .enumerate()
            .map(|(i, path)| {
                let idx = i + 1;
                let result = std::fs::read(path)
                    .context(IoSnafu {
                        path: path.display().to_string(),
                    })
                    .and_then(|raw| {
                        let ocr = ocr_for(path).map_err(|e| e.at_stage("ocr"))?;
                        self.process_image_bytes(&raw, ocr.as_ref())
                    });

                match result {
                    Ok((jpeg, mut report)) => {
                        let image_path =
                            io.results_img_dir.join(format!("redacted_{:04}.jpg", idx));
                        std::fs::write(&image_path, jpeg).context(IoSnafu {
                            path: image_path.display().to_string(),
                        })?;

                        report.source_image = Some(path.display().to_string());
                        report.redactions.redacted_image_path =
                            Some(image_path.display().to_string());
                        let report_path =
                            io.results_rpt_dir.join(format!("report_{:04}.json", idx));
                        write_json(&report, &report_path)?;
                        Ok(report_path)
                    }
                    Err(err) => {
                        error!(image = %path.display(), "Failed to redact: {}", err);
                        let report_path =
                            io.results_rpt_dir.join(format!("report_{:04}_ERROR.json", idx));
                        let report = ErrorReport::new(path.display().to_string(), &err);
                        write_json(&report, &report_path)?;
                        Ok(report_path)
                    }
                }
            })
            .collect()
    }
}

/// Image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, RedactError> {
    let entries = std::fs::read_dir(dir).context(IoSnafu {
        path: dir.display().to_string(),
    })?;

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        })
        .collect();
    images.sort();
    Ok(images)
}
