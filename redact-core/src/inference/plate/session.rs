use std::sync::Mutex;

use glam::Vec2;
use image::{RgbImage, imageops::FilterType};
use ndarray::{Ix3, prelude::*};
use ort::{
    session::{Session, builder::SessionBuilder},
    value::TensorRef,
};
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info};

use crate::{
    analysis::{
        bbox::Bbox,
        region::{BoxSource, Region},
    },
    error::*,
    inference::{
        model::{Model, OnnxSession, commit_from_path},
        plate::{
            ObjectDetector,
            model::{PlateConfig, PlateModel},
        },
    },
};

/// Source image size and the resize factor applied before inference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateMeta {
    pub width: u32,
    pub height: u32,
    pub scale: f32,
}

/// A raw prediction in model input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub min: Vec2,
    pub max: Vec2,
    pub score: f32,
    pub class_id: usize,
}

impl Detection {
    fn area(&self) -> f32 {
        let size = (self.max - self.min).max(Vec2::ZERO);
        size.x * size.y
    }

    fn iou(&self, other: &Self) -> f32 {
        let size = (self.max.min(other.max) - self.min.max(other.min)).max(Vec2::ZERO);
        let inter = size.x * size.y;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

pub struct PlateSession<M: Model> {
    session: Mutex<Session>,
    model: M,
    input_name: String,
    output_name: String,
}

impl PlateSession<PlateModel> {
    pub fn new(builder: SessionBuilder, model: PlateModel) -> Result<Self, RedactError> {
        let session = commit_from_path(builder, &model)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| PlateModel::INPUT_NAME.to_string());
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .context(NotFoundOutputSnafu {
                output_name: PlateModel::OUTPUT_NAME,
            })?;

        info!(path = %model.path().display(), %input_name, %output_name, "Loaded plate detector");
        Ok(Self {
            session: Mutex::new(session),
            model,
            input_name,
            output_name,
        })
    }
}

impl OnnxSession<PlateModel> for PlateSession<PlateModel> {
    type Source = RgbImage;
    type Output = Vec<Region>;
    type Extra = PlateMeta;

    fn preprocess(&self, image: &RgbImage) -> Result<<PlateModel as Model>::Input, RedactError> {
        let config = self.model.config();
        let (w0, h0) = image.dimensions();
        if w0 == 0 || h0 == 0 {
            return InputShapeSnafu {
                message: format!("empty image {}x{}", w0, h0),
            }
            .fail();
        }

        let (_, w_new, h_new) = letterbox_size(w0, h0, config.input_size);
        let resized = image::imageops::resize(image, w_new, h_new, FilterType::Triangle);

        // Resized image sits in the top-left corner; the rest is background.
        let mut input = Array4::from_elem(
            [1, 3, config.input_size, config.input_size],
            config.background_fill_value,
        );
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = pixel.0;
            input[[0, 0, y, x]] = r as f32 / 255.0;
            input[[0, 1, y, x]] = g as f32 / 255.0;
            input[[0, 2, y, x]] = b as f32 / 255.0;
        }

        Ok(input)
    }

    fn postprocess(
        &self,
        output: <PlateModel as Model>::Output,
        extra: Self::Extra,
    ) -> Result<Self::Output, RedactError> {
        let config = self.model.config();
        let predictions = output.index_axis(Axis(0), 0);

        let detections = suppress(
            decode(predictions, config.score_threshold),
            config.iou_threshold,
        );
        debug!(detections = detections.len(), "Plate detections after suppression");

        Ok(detections
            .iter()
            .map(|d| to_region(d, config, &extra))
            .collect())
    }

    fn infer(
        &self,
        input: <PlateModel as Model>::Input,
    ) -> Result<<PlateModel as Model>::Output, RedactError> {
        let mut session = self.session.lock().map_err(|_| RedactError::Inference {
            stage: "lock".to_string(),
            message: "plate session lock poisoned".to_string(),
        })?;

        let images = TensorRef::from_array_view(&input).context(TensorSnafu { stage: "input" })?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => images])
            .context(OrtRunSnafu)?;

        let tensor = outputs
            .get(self.output_name.as_str())
            .context(NotFoundOutputSnafu {
                output_name: self.output_name.clone(),
            })?
            .try_extract_array::<f32>()
            .context(TensorSnafu { stage: "extract" })?;

        // [1, 4 + classes, candidates]; the candidate count depends on the export.
        let output = tensor
            .to_owned()
            .into_dimensionality::<Ix3>()
            .context(ShapeSnafu { stage: "output" })?;
        if output.shape()[1] <= 4 {
            return Err(RedactError::Inference {
                stage: "output".to_string(),
                message: format!("unexpected plate output shape {:?}", output.shape()),
            });
        }

        Ok(output)
    }
}

impl ObjectDetector for PlateSession<PlateModel> {
    fn name(&self) -> &str {
        PlateModel::MODEL_NAME
    }

    fn detect(&self, image: &RgbImage) -> Result<Vec<Region>, RedactError> {
        let (width, height) = image.dimensions();
        let (scale, _, _) = letterbox_size(width, height, self.model.config().input_size);
        self.run(
            image,
            PlateMeta {
                width,
                height,
                scale,
            },
        )
    }
}

/// Scale and resized size that fit `(w, h)` into a `target` square.
fn letterbox_size(w: u32, h: u32, target: usize) -> (f32, u32, u32) {
    let target = target as f32;
    let scale = f32::min(target / w as f32, target / h as f32);
    let w_new = ((w as f32 * scale).round() as u32).clamp(1, target as u32);
    let h_new = ((h as f32 * scale).round() as u32).clamp(1, target as u32);
    (scale, w_new, h_new)
}

/// Center-size predictions `[4 + classes, candidates]` whose best class
/// score reaches `threshold`.
pub fn decode(predictions: ArrayView2<f32>, threshold: f32) -> Vec<Detection> {
    predictions
        .axis_iter(Axis(1))
        .filter_map(|prediction| {
            let (class_id, score) = prediction
                .slice(s![4..])
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, (id, p)| {
                    if p > best.1 { (id, p) } else { best }
                });
            if score < threshold {
                return None;
            }
            let center = Vec2::new(prediction[0], prediction[1]);
            let half = Vec2::new(prediction[2], prediction[3]) / 2.0;
            Some(Detection {
                min: center - half,
                max: center + half,
                score,
                class_id,
            })
        })
        .collect()
}

/// Greedy suppression: the higher-scoring box wins any pair above `iou_threshold`.
pub fn suppress(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for detection in detections {
        if kept.iter().all(|k| k.iou(&detection) <= iou_threshold) {
            kept.push(detection);
        }
    }
    kept
}

/// Maps a detection back to source pixels, clamped to `[0, w-1] x [0, h-1]`.
fn to_region(detection: &Detection, config: &PlateConfig, meta: &PlateMeta) -> Region {
    let bbox = Bbox::from_f32_corners(detection.min / meta.scale, detection.max / meta.scale)
        .clip(meta.width, meta.height);
    Region::new(
        bbox,
        config.label(detection.class_id),
        Some(detection.score),
        BoxSource::Detector,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn predictions(rows: &[[f32; 6]]) -> Array2<f32> {
        // columns are candidates: cx, cy, w, h, class0, class1
        let mut out = Array2::zeros((6, rows.len()));
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                out[[j, i]] = v;
            }
        }
        out
    }

    #[test]
    fn test_decode_threshold_and_class() {
        let preds = predictions(&[
            [50.0, 50.0, 20.0, 10.0, 0.9, 0.1],
            [10.0, 10.0, 4.0, 4.0, 0.1, 0.2],
            [80.0, 80.0, 10.0, 10.0, 0.05, 0.6],
        ]);
        let detections = decode(preds.view(), 0.25);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].min, Vec2::new(40.0, 45.0));
        assert_eq!(detections[0].max, Vec2::new(60.0, 55.0));
        assert_eq!(detections[0].class_id, 0);
        assert_eq!(detections[1].class_id, 1);
    }

    #[test]
    fn test_suppress_keeps_higher_score() {
        let a = Detection {
            min: Vec2::new(0.0, 0.0),
            max: Vec2::new(10.0, 10.0),
            score: 0.5,
            class_id: 0,
        };
        let b = Detection { score: 0.9, ..a };
        let far = Detection {
            min: Vec2::new(50.0, 50.0),
            max: Vec2::new(60.0, 60.0),
            score: 0.3,
            class_id: 0,
        };
        let kept = suppress(vec![a, b, far], 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].score, 0.9);
        assert_eq!(kept[1].score, 0.3);
    }

    #[test]
    fn test_region_is_scaled_and_clamped() {
        let config = PlateConfig::default();
        let meta = PlateMeta {
            width: 100,
            height: 50,
            scale: 2.0,
        };
        let detection = Detection {
            min: Vec2::new(-10.0, 20.0),
            max: Vec2::new(300.0, 60.0),
            score: 0.8,
            class_id: 7,
        };
        let region = to_region(&detection, &config, &meta);
        assert_eq!(region.bbox.xyxy(), [0, 10, 99, 30]);
        assert_eq!(region.label, "license_plate");
        assert_eq!(region.source, BoxSource::Detector);
    }

    #[test]
    fn test_letterbox_size() {
        let (scale, w, h) = letterbox_size(1280, 640, 640);
        assert_eq!(scale, 0.5);
        assert_eq!((w, h), (640, 320));
    }
}
