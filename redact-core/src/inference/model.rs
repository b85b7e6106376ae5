use std::path::Path;

use ort::{
    execution_providers::CPUExecutionProvider,
    session::{
        Session,
        builder::{GraphOptimizationLevel, SessionBuilder},
    },
};
use snafu::ResultExt;

use crate::error::{OrtInitSnafu, RedactError};

pub trait Model {
    type Input;
    type Output;
    type Config;

    const INPUT_NAME: &'static str;
    const OUTPUT_NAME: &'static str;
    const MODEL_NAME: &'static str;

    /// Location of the ONNX weights on disk.
    fn path(&self) -> &Path;
    fn config(&self) -> &Self::Config;
}

/// Preprocess, run and postprocess one model.
///
/// Sessions keep their ONNX session behind a lock so a single instance can be
/// shared across requests; `run` only needs `&self`.
pub trait OnnxSession<M: Model> {
    type Source: ?Sized;
    type Output;
    type Extra;

    fn preprocess(&self, source: &Self::Source) -> Result<M::Input, RedactError>;

    fn postprocess(
        &self,
        output: M::Output,
        extra: Self::Extra,
    ) -> Result<Self::Output, RedactError>;

    fn infer(&self, input: M::Input) -> Result<M::Output, RedactError>;

    fn run(&self, source: &Self::Source, extra: Self::Extra) -> Result<Self::Output, RedactError> {
        let input = self.preprocess(source)?;

        let output = self.infer(input)?;

        self.postprocess(output, extra)
    }
}

/// common session builder
pub fn session_builder() -> Result<SessionBuilder, RedactError> {
    let session_builder = Session::builder()
        .context(OrtInitSnafu { stage: "builder" })?
        .with_execution_providers(vec![
            #[cfg(all(feature = "coreml", target_os = "macos"))]
            {
                use ort::execution_providers::CoreMLExecutionProvider;
                use ort::execution_providers::coreml::*;
                CoreMLExecutionProvider::default()
                    .with_model_format(CoreMLModelFormat::MLProgram)
                    .build()
            },
            #[cfg(feature = "cuda")]
            {
                use ort::execution_providers::CUDAExecutionProvider;
                CUDAExecutionProvider::default().build()
            },
            CPUExecutionProvider::default().build(),
        ])
        .context(OrtInitSnafu { stage: "provider" })?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .context(OrtInitSnafu {
            stage: "optimization",
        })?
        .with_intra_threads(4)
        .context(OrtInitSnafu {
            stage: "intra-threads",
        })?;

    Ok(session_builder)
}

/// Commits a session from a weights file, failing with `ModelLoad` when the
/// file is missing.
pub fn commit_from_path<M: Model>(
    builder: SessionBuilder,
    model: &M,
) -> Result<Session, RedactError> {
    let path = model.path();
    if !path.is_file() {
        return Err(RedactError::ModelLoad {
            stage: M::MODEL_NAME.to_string(),
            message: format!("weights file `{}` not found", path.display()),
        });
    }
    builder
        .commit_from_file(path)
        .context(OrtInitSnafu { stage: "commit" })
}
