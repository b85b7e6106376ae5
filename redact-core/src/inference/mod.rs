pub mod model;
pub mod ner;
pub mod plate;

pub use plate::{ObjectDetector, StaticDetections};
