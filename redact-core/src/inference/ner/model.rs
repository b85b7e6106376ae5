use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayBase, Dim, OwnedRepr};

use crate::inference::model::Model;

/// `[1, seq]` id, mask and type-id rows.
#[derive(Debug, Clone)]
pub struct NerInput {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
    pub token_type_ids: Array2<i64>,
}

/// `[seq, labels]` logits for the single batch row.
pub type NerOutput = ArrayBase<OwnedRepr<f32>, Dim<[usize; 2]>>;

#[derive(Debug, Clone, PartialEq)]
pub struct NerModelConfig {
    pub max_length: usize,
}

impl Default for NerModelConfig {
    fn default() -> Self {
        Self { max_length: 256 }
    }
}

/// Token-classification model exported to ONNX.
#[derive(Debug, Clone)]
pub struct NerModel {
    path: PathBuf,
    config: NerModelConfig,
}

impl NerModel {
    pub fn new(path: impl Into<PathBuf>, config: NerModelConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

impl Model for NerModel {
    type Input = NerInput;
    type Output = NerOutput;
    type Config = NerModelConfig;

    const INPUT_NAME: &'static str = "input_ids";
    const OUTPUT_NAME: &'static str = "logits";
    const MODEL_NAME: &'static str = "ner";

    fn path(&self) -> &Path {
        &self.path
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
