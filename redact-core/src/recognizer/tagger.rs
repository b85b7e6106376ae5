//! Token-classification recognizer.
//!
//! Text is tokenized into sub-words, classified once, and the per-token BIO
//! predictions are grouped back into entity spans over the input text.

use std::{env, path::PathBuf, sync::Arc};

use derive_builder::Builder;
use ndarray::{Array2, Axis};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    analysis::labels::{BioTag, EntityGroup},
    error::RedactError,
    inference::{
        model::session_builder,
        ner::{
            Encoded, HfTokenizer, LabelTable, NerModel, NerModelConfig, NerSession,
            SubwordTokenizer, TokenClassifier,
        },
    },
    text::{EntitySet, EntitySpan},
};

use super::Recognizer;

pub const TAGGER_NAME: &str = "sequence_tagger";

static SHARED: OnceCell<Arc<SequenceTagger>> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[builder(default)]
#[serde(default)]
pub struct TaggerConfig {
    pub enabled: bool,
    /// ONNX token-classification weights.
    pub model_path: Option<PathBuf>,
    /// `tokenizer.json` or a directory containing it.
    pub tokenizer_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    /// HuggingFace `config.json` carrying `id2label`.
    pub config_path: Option<PathBuf>,
    pub max_length: usize,
    pub score_threshold: f32,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_path: None,
            tokenizer_path: None,
            labels_path: None,
            config_path: None,
            max_length: 256,
            score_threshold: 0.60,
        }
    }
}

impl TaggerConfig {
    /// Applies `ONNX_MODEL_PATH`, `TOKENIZER_PATH`, `NER_LABELS_PATH`,
    /// `NER_CONFIG_PATH` and `HF_MAX_LEN` when set.
    pub fn apply_env(&mut self) -> Result<(), RedactError> {
        let path_var = |name: &str| env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);

        if let Some(path) = path_var("ONNX_MODEL_PATH") {
            self.model_path = Some(path);
        }
        if let Some(path) = path_var("TOKENIZER_PATH") {
            self.tokenizer_path = Some(path);
        }
        if let Some(path) = path_var("NER_LABELS_PATH") {
            self.labels_path = Some(path);
        }
        if let Some(path) = path_var("NER_CONFIG_PATH") {
            self.config_path = Some(path);
        }
        if let Ok(value) = env::var("HF_MAX_LEN") {
            self.max_length = value
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|&len| len > 0)
                .ok_or(RedactError::EnvInvalid {
                    name: "HF_MAX_LEN".to_string(),
                    value,
                })?;
        }
        Ok(())
    }
}

/// A span of one tagger group before entity-name mapping and filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpan {
    pub group: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

struct OpenSpan<'a> {
    group: &'a str,
    start: usize,
    end: usize,
    score_sum: f32,
    tokens: usize,
}

impl OpenSpan<'_> {
    fn close(self) -> GroupSpan {
        GroupSpan {
            group: self.group.to_string(),
            start: self.start,
            end: self.end,
            confidence: self.score_sum / self.tokens as f32,
        }
    }
}

/// Row-wise softmax with the row maximum subtracted first.
pub fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut probs = logits.clone();
    for mut row in probs.axis_iter_mut(Axis(0)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        }
    }
    probs
}

/// `(label_id, probability)` of the most likely label for every row.
pub fn argmax_rows(probs: &Array2<f32>) -> Vec<(usize, f32)> {
    probs
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (id, p)| {
                    if p > best.1 { (id, p) } else { best }
                })
        })
        .collect()
}

/// Groups per-token predictions into spans.
///
/// Tokens with an empty offset range are skipped without closing the open
/// span. `O` closes it. A `B-`/`I-` tag of the open span's group extends it
/// whatever the prefix; any other group closes it and opens a new one.
pub fn aggregate_bio(
    predictions: &[(usize, f32)],
    offsets: &[(usize, usize)],
    labels: &LabelTable,
) -> Vec<GroupSpan> {
    let mut spans = Vec::new();
    let mut open: Option<OpenSpan> = None;

    for (&(label_id, score), &(start, end)) in predictions.iter().zip(offsets) {
        if start == end {
            continue;
        }
        match BioTag::parse(labels.label(label_id)) {
            BioTag::Outside => {
                if let Some(span) = open.take() {
                    spans.push(span.close());
                }
            }
            BioTag::Entity { group, .. } => match open.as_mut() {
                Some(span) if span.group == group => {
                    span.end = end;
                    span.score_sum += score;
                    span.tokens += 1;
                }
                _ => {
                    if let Some(span) = open.take() {
                        spans.push(span.close());
                    }
                    open = Some(OpenSpan {
                        group,
                        start,
                        end,
                        score_sum: score,
                        tokens: 1,
                    });
                }
            },
        }
    }
    if let Some(span) = open {
        spans.push(span.close());
    }
    spans
}

/// Tokenizer, classifier and label table behind the [`Recognizer`] contract.
///
/// Immutable after construction; share one instance with [`SequenceTagger::shared`].
pub struct SequenceTagger {
    tokenizer: Box<dyn SubwordTokenizer>,
    classifier: Box<dyn TokenClassifier>,
    labels: LabelTable,
    score_threshold: f32,
}

impl SequenceTagger {
    pub fn new(
        tokenizer: Box<dyn SubwordTokenizer>,
        classifier: Box<dyn TokenClassifier>,
        labels: LabelTable,
        score_threshold: f32,
    ) -> Self {
        Self {
            tokenizer,
            classifier,
            labels,
            score_threshold,
        }
    }

    /// Loads the tokenizer, label table and ONNX session named by `config`.
    pub fn load(config: &TaggerConfig) -> Result<Self, RedactError> {
        let model_path = config.model_path.as_ref().ok_or_else(|| RedactError::ModelLoad {
            stage: "tagger".to_string(),
            message: "no model path configured (set `tagger.model_path` or ONNX_MODEL_PATH)"
                .to_string(),
        })?;
        if model_path.extension().is_none_or(|ext| ext != "onnx") {
            return Err(RedactError::ModelLoad {
                stage: "tagger".to_string(),
                message: format!("`{}` is not an .onnx file", model_path.display()),
            });
        }
        let tokenizer_path = config.tokenizer_path.as_ref().ok_or_else(|| RedactError::ModelLoad {
            stage: "tagger".to_string(),
            message: "no tokenizer path configured (set `tagger.tokenizer_path` or TOKENIZER_PATH)"
                .to_string(),
        })?;

        let tokenizer = HfTokenizer::from_path(tokenizer_path, config.max_length)?;
        let labels =
            LabelTable::load(config.labels_path.as_deref(), config.config_path.as_deref())?;
        let model = NerModel::new(
            model_path,
            NerModelConfig {
                max_length: config.max_length,
            },
        );
        let session = NerSession::new(session_builder()?, model)?;

        info!(labels = labels.len(), max_length = config.max_length, "Sequence tagger ready");
        Ok(Self::new(
            Box::new(tokenizer),
            Box::new(session),
            labels,
            config.score_threshold,
        ))
    }

    /// The process-wide tagger, loaded on first call.
    ///
    /// Later calls return the first instance whatever `config` they pass.
    pub fn shared(config: &TaggerConfig) -> Result<Arc<Self>, RedactError> {
        Self::shared_with(&SHARED, || Self::load(config))
    }

    /// Runs `init` at most once per `cell`. Concurrent callers block until
    /// the winner finishes; a failed `init` leaves the cell empty.
    pub fn shared_with<F>(cell: &OnceCell<Arc<Self>>, init: F) -> Result<Arc<Self>, RedactError>
    where
        F: FnOnce() -> Result<Self, RedactError>,
    {
        cell.get_or_try_init(|| init().map(Arc::new)).cloned()
    }

    /// Entity spans for every known group at or above the threshold.
    pub fn infer(&self, text: &str) -> Result<Vec<EntitySpan>, RedactError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let encoded: Encoded = self.tokenizer.encode(text)?;
        if encoded.is_empty() {
            return Ok(Vec::new());
        }
        let logits = self.classifier.logits(&encoded)?;
        if logits.nrows() < encoded.offsets.len() {
            return Err(RedactError::Inference {
                stage: "tagger".to_string(),
                message: format!(
                    "classifier returned {} rows for {} tokens",
                    logits.nrows(),
                    encoded.offsets.len()
                ),
            });
        }

        let predictions = argmax_rows(&softmax_rows(&logits));
        let groups = aggregate_bio(&predictions, &encoded.offsets, &self.labels);
        debug!(tokens = encoded.len(), groups = groups.len(), "Tagged text");

        Ok(groups
            .into_iter()
            .filter(|span| span.confidence >= self.score_threshold)
            .filter_map(|span| {
                let entity = EntityGroup::from_tag(&span.group)?;
                Some(EntitySpan::new(
                    entity.name(),
                    span.start,
                    span.end,
                    span.confidence,
                    TAGGER_NAME,
                ))
            })
            .collect())
    }
}

impl Recognizer for SequenceTagger {
    fn name(&self) -> &str {
        TAGGER_NAME
    }

    fn produce_spans(
        &self,
        text: &str,
        entities: &EntitySet,
    ) -> Result<Vec<EntitySpan>, RedactError> {
        let spans = self.infer(text)?;
        Ok(spans
            .into_iter()
            .filter(|span| entities.contains(&span.entity_type))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ndarray::array;

    use super::*;

    /// Splits on spaces; each word is one token, wrapped in empty-offset
    /// special tokens.
    pub(crate) struct WhitespaceTokenizer;

    impl SubwordTokenizer for WhitespaceTokenizer {
        fn encode(&self, text: &str) -> Result<Encoded, RedactError> {
            let mut offsets = vec![(0, 0)];
            let mut pos = 0;
            for word in text.split(' ') {
                if !word.is_empty() {
                    offsets.push((pos, pos + word.len()));
                }
                pos += word.len() + 1;
            }
            offsets.push((0, 0));
            let n = offsets.len();
            Ok(Encoded {
                ids: (0..n as i64).collect(),
                attention_mask: vec![1; n],
                type_ids: vec![0; n],
                offsets,
            })
        }
    }

    /// Returns fixed logits, one row per token.
    pub(crate) struct FixedLogits(pub Array2<f32>);

    impl TokenClassifier for FixedLogits {
        fn logits(&self, _encoded: &Encoded) -> Result<Array2<f32>, RedactError> {
            Ok(self.0.clone())
        }
    }

    pub(crate) struct BrokenClassifier;

    impl TokenClassifier for BrokenClassifier {
        fn logits(&self, _encoded: &Encoded) -> Result<Array2<f32>, RedactError> {
            Err(RedactError::Inference {
                stage: "test".to_string(),
                message: "model exploded".to_string(),
            })
        }
    }

    /// Logits whose argmax is `label_id` with a large margin.
    fn one_hot(rows: &[usize], labels: usize) -> Array2<f32> {
        let mut logits = Array2::zeros((rows.len(), labels));
        for (row, &label) in rows.iter().enumerate() {
            logits[[row, label]] = 10.0;
        }
        logits
    }

    fn tagger(logits: Array2<f32>, threshold: f32) -> SequenceTagger {
        SequenceTagger::new(
            Box::new(WhitespaceTokenizer),
            Box::new(FixedLogits(logits)),
            LabelTable::default(),
            threshold,
        )
    }

    #[test]
    fn test_softmax_is_stable_and_normalized() {
        let logits = array![[1000.0_f32, 1000.0], [0.0, f32::ln(3.0)]];
        let probs = softmax_rows(&logits);
        assert!((probs[[0, 0]] - 0.5).abs() < 1e-6);
        assert!((probs[[1, 1]] - 0.75).abs() < 1e-6);
        for row in probs.axis_iter(Axis(0)) {
            assert!((row.sum() - 1.0).abs() < 1e-6);
        }
        assert_eq!(argmax_rows(&probs)[1].0, 1);
    }

    #[test]
    fn test_bio_scenario() {
        let labels = LabelTable::default();
        // B-PER, I-PER, O, B-LOC
        let predictions = [(3, 0.9), (4, 0.7), (0, 0.99), (7, 0.8)];
        let offsets = [(0, 4), (5, 9), (10, 11), (12, 15)];

        let spans = aggregate_bio(&predictions, &offsets, &labels);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].group.as_str(), spans[0].start, spans[0].end), ("PER", 0, 9));
        assert!((spans[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!((spans[1].group.as_str(), spans[1].start, spans[1].end), ("LOC", 12, 15));
        assert_eq!(spans[1].confidence, 0.8);
    }

    #[test]
    fn test_b_after_i_of_same_group_continues() {
        let labels = LabelTable::default();
        // B-ORG, I-ORG, B-ORG, B-PER
        let predictions = [(5, 1.0), (6, 1.0), (5, 1.0), (3, 1.0)];
        let offsets = [(0, 3), (4, 7), (8, 11), (12, 15)];

        let spans = aggregate_bio(&predictions, &offsets, &labels);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].group.as_str(), spans[0].start, spans[0].end), ("ORG", 0, 11));
        assert_eq!((spans[1].group.as_str(), spans[1].start), ("PER", 12));
    }

    #[test]
    fn test_special_tokens_do_not_break_spans() {
        let labels = LabelTable::default();
        // B-PER, special (tagged O), I-PER, unknown id
        let predictions = [(3, 0.9), (0, 0.9), (4, 0.9), (99, 0.9)];
        let offsets = [(0, 4), (0, 0), (5, 8), (9, 12)];

        let spans = aggregate_bio(&predictions, &offsets, &labels);
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (0, 8));
    }

    #[test]
    fn test_infer_maps_groups_and_filters() {
        // [CLS] Jane Doe visited Paris [SEP]
        let logits = one_hot(&[0, 3, 4, 0, 7, 0], 9);
        let tagger = tagger(logits, 0.6);

        let spans = tagger.infer("Jane Doe visited Paris").unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].entity_type, "PERSON");
        assert_eq!((spans[0].start, spans[0].end), (0, 8));
        assert_eq!(spans[0].recognizer, TAGGER_NAME);
        assert_eq!(spans[1].entity_type, "LOCATION");
        assert_eq!((spans[1].start, spans[1].end), (17, 22));

        let only_people = tagger
            .produce_spans("Jane Doe visited Paris", &EntitySet::new(["PERSON"]))
            .unwrap();
        assert_eq!(only_people.len(), 1);
        assert_eq!(only_people[0].entity_type, "PERSON");
    }

    #[test]
    fn test_low_confidence_spans_dropped() {
        // flat logits give every label 1/9
        let mut logits = Array2::<f32>::zeros((3, 9));
        logits[[1, 3]] = 0.1;
        let tagger = tagger(logits, 0.6);
        assert!(tagger.infer("Jane").unwrap().is_empty());
    }

    #[test]
    fn test_misc_maps_to_nrp() {
        let tagger = tagger(one_hot(&[0, 1, 0], 9), 0.6);
        let spans = tagger.infer("French").unwrap();
        assert_eq!(spans[0].entity_type, "NRP");
    }

    #[test]
    fn test_empty_text_skips_model() {
        let tagger = SequenceTagger::new(
            Box::new(WhitespaceTokenizer),
            Box::new(BrokenClassifier),
            LabelTable::default(),
            0.6,
        );
        assert!(tagger.infer("").unwrap().is_empty());
        assert!(matches!(
            tagger.infer("Jane"),
            Err(RedactError::Inference { .. })
        ));
    }

    #[test]
    fn test_short_logits_are_an_error() {
        let tagger = tagger(one_hot(&[0], 9), 0.6);
        assert!(matches!(
            tagger.infer("Jane Doe"),
            Err(RedactError::Inference { .. })
        ));
    }

    #[test]
    fn test_load_without_model_fails() {
        let config = TaggerConfig::default();
        assert!(matches!(
            SequenceTagger::load(&config),
            Err(RedactError::ModelLoad { .. })
        ));

        let config = TaggerConfigBuilder::default()
            .model_path(Some(PathBuf::from("weights.bin")))
            .tokenizer_path(Some(PathBuf::from("tokenizer.json")))
            .build()
            .unwrap();
        assert!(matches!(
            SequenceTagger::load(&config),
            Err(RedactError::ModelLoad { .. })
        ));
    }

    #[test]
    fn test_shared_initializes_once_across_threads() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let cell = OnceCell::new();
        let loads = AtomicUsize::new(0);
        let (cell_ref, loads_ref) = (&cell, &loads);

        let taggers: Vec<Arc<SequenceTagger>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        SequenceTagger::shared_with(cell_ref, || {
                            loads_ref.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(20));
                            Ok(tagger(one_hot(&[0], 9), 0.6))
                        })
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(taggers.len(), 8);
        assert!(taggers.iter().all(|t| Arc::ptr_eq(t, &taggers[0])));

        // A later init closure is never called once the cell is set.
        let again = SequenceTagger::shared_with(&cell, || {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(tagger(one_hot(&[0], 9), 0.1))
        })
        .unwrap();
        assert!(Arc::ptr_eq(&again, &taggers[0]));
        assert_eq!(again.score_threshold, 0.6);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_failed_init_is_retried() {
        let cell = OnceCell::new();
        let err = SequenceTagger::shared_with(&cell, || {
            Err(RedactError::ModelLoad {
                stage: "tagger".to_string(),
                message: "missing weights".to_string(),
            })
        });
        assert!(matches!(err, Err(RedactError::ModelLoad { .. })));
        assert!(cell.get().is_none());

        let loaded =
            SequenceTagger::shared_with(&cell, || Ok(tagger(one_hot(&[0], 9), 0.6))).unwrap();
        assert!(Arc::ptr_eq(&loaded, cell.get().unwrap()));
    }
}
