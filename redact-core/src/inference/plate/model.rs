use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use ndarray::{ArrayBase, Dim, OwnedRepr};
use serde::{Deserialize, Serialize};

use crate::inference::model::Model;

pub type PlateInput = ArrayBase<OwnedRepr<f32>, Dim<[usize; 4]>>;
pub type PlateOutput = ArrayBase<OwnedRepr<f32>, Dim<[usize; 3]>>;

/// Label used for class ids missing from [`PlateConfig::labels`].
pub const DEFAULT_PLATE_LABEL: &str = "license_plate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateConfig {
    pub model_path: Option<PathBuf>,
    pub score_threshold: f32,
    pub iou_threshold: f32,
    /// Side of the square model input.
    pub input_size: usize,
    pub background_fill_value: f32,
    /// Class id (as a string key) to label.
    pub labels: BTreeMap<String, String>,
}

impl Default for PlateConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            score_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            background_fill_value: 114.0 / 255.0,
            labels: BTreeMap::from([("0".to_string(), DEFAULT_PLATE_LABEL.to_string())]),
        }
    }
}

impl PlateConfig {
    pub fn label(&self, class_id: usize) -> &str {
        self.labels
            .get(&class_id.to_string())
            .map(String::as_str)
            .unwrap_or(DEFAULT_PLATE_LABEL)
    }
}

pub struct PlateModel {
    path: PathBuf,
    config: PlateConfig,
}

impl PlateModel {
    pub fn new(path: impl Into<PathBuf>, config: PlateConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }
}

impl Model for PlateModel {
    type Input = PlateInput;
    type Output = PlateOutput;
    type Config = PlateConfig;

    const INPUT_NAME: &'static str = "images";
    const OUTPUT_NAME: &'static str = "output0";
    const MODEL_NAME: &'static str = "license-plate-yolo";

    fn path(&self) -> &Path {
        &self.path
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
