//! License-plate detection on a YOLO ONNX export.

pub mod model;
pub mod session;

use image::RgbImage;

use crate::{analysis::region::Region, error::RedactError};

pub use model::{PlateConfig, PlateModel};
pub use session::{PlateMeta, PlateSession};

/// Turns an image into labelled boxes in source pixel coordinates.
pub trait ObjectDetector: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, image: &RgbImage) -> Result<Vec<Region>, RedactError>;
}

/// Returns the same boxes for every image.
#[derive(Debug, Clone, Default)]
pub struct StaticDetections(pub Vec<Region>);

impl ObjectDetector for StaticDetections {
    fn name(&self) -> &str {
        "static"
    }

    fn detect(&self, _image: &RgbImage) -> Result<Vec<Region>, RedactError> {
        Ok(self.0.clone())
    }
}
