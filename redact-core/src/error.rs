use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RedactError {
    #[snafu(display("Input image shape error: {}", message))]
    InputShape { message: String },
    #[snafu(display("Model load `{}` error: {}", stage, message))]
    ModelLoad { stage: String, message: String },
    #[snafu(display("Ort Session init stage `{}` error: {}", stage, source))]
    OrtInit {
        source: ort::error::Error,
        stage: String,
    },
    #[snafu(display("Build Tensor for `{}` error: {}", stage, source))]
    Tensor {
        source: ort::error::Error,
        stage: String,
    },
    #[snafu(display("Inference `{}` error: {}", stage, message))]
    Inference { stage: String, message: String },
    #[snafu(display("Onnx Inference error: {}", source))]
    OrtRun { source: ort::error::Error },
    #[snafu(display("Onnx Output can not found {}", output_name))]
    NotFoundOutput { output_name: String },
    #[snafu(display("Tokenize `{}` error: {}", stage, message))]
    Tokenize { stage: String, message: String },
    #[snafu(display("Ndarray Shape error at stage `{}`: {}", stage, source))]
    Shape {
        source: ndarray::ShapeError,
        stage: String,
    },
    #[snafu(display("Span [{}, {}) outside text of length {}", start, end, len))]
    InvalidSpan { start: usize, end: usize, len: usize },
    #[snafu(display("Encoder `{}` produced zero bytes", stage))]
    EmptyOutput { stage: String },
    #[snafu(display("Image Decode error: {}", source))]
    ImageDecode { source: image::ImageError },
    #[snafu(display("Image Encode error: {}", source))]
    ImageEncode { source: image::ImageError },
    #[snafu(display("Io `{}` error: {}", path, source))]
    Io {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Config `{}` parse error: {}", path, source))]
    ConfigParse {
        source: toml::de::Error,
        path: String,
    },
    #[snafu(display("Pattern `{}` compile error: {}", name, source))]
    Pattern { source: regex::Error, name: String },
    #[snafu(display("Report serialize error: {}", source))]
    Report { source: serde_json::Error },
    #[snafu(display("OCR TSV line {} parse error: {}", line, message))]
    OcrParse { line: usize, message: String },
    #[snafu(display("Environment `{}` invalid value `{}`", name, value))]
    EnvInvalid { name: String, value: String },
    #[snafu(display("Pipeline stage `{}` failed: {}", stage, source))]
    Pipeline {
        stage: String,
        source: Box<RedactError>,
    },
}

impl RedactError {
    /// Wraps an error with the pipeline stage it surfaced from.
    pub fn at_stage(self, stage: &str) -> Self {
        match self {
            err @ RedactError::Pipeline { .. } => err,
            err => RedactError::Pipeline {
                stage: stage.to_string(),
                source: Box::new(err),
            },
        }
    }

    pub fn stage(&self) -> Option<&str> {
        match self {
            RedactError::Pipeline { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
