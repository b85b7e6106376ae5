use std::sync::Mutex;

use ndarray::Array2;
use ort::{
    session::{Session, SessionInputValue, builder::SessionBuilder},
    tensor::TensorElementType,
    value::{Tensor, ValueType},
};
use snafu::{OptionExt, ResultExt};
use tracing::{debug, info};

use crate::{
    error::*,
    inference::{
        model::{Model, OnnxSession, commit_from_path},
        ner::{
            model::{NerInput, NerModel},
            tokenizer::Encoded,
        },
    },
};

/// Produces per-token logits `[seq, labels]` for an encoded sequence.
pub trait TokenClassifier: Send + Sync {
    fn logits(&self, encoded: &Encoded) -> Result<Array2<f32>, RedactError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputRole {
    Ids,
    Mask,
    TypeIds,
}

#[derive(Debug, Clone)]
struct InputSlot {
    name: String,
    role: InputRole,
    int32: bool,
}

pub struct NerSession<M: Model> {
    session: Mutex<Session>,
    model: M,
    inputs: Vec<InputSlot>,
    output_name: String,
}

impl NerSession<NerModel> {
    pub fn new(builder: SessionBuilder, model: NerModel) -> Result<Self, RedactError> {
        let session = commit_from_path(builder, &model)?;

        let inputs = session
            .inputs
            .iter()
            .map(|input| {
                let role = match input.name.as_str() {
                    "input_ids" => InputRole::Ids,
                    "attention_mask" => InputRole::Mask,
                    "token_type_ids" => InputRole::TypeIds,
                    other => {
                        return Err(RedactError::ModelLoad {
                            stage: NerModel::MODEL_NAME.to_string(),
                            message: format!("unsupported model input `{}`", other),
                        });
                    }
                };
                let int32 = matches!(
                    input.input_type,
                    ValueType::Tensor {
                        ty: TensorElementType::Int32,
                        ..
                    }
                );
                Ok(InputSlot {
                    name: input.name.clone(),
                    role,
                    int32,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output_name = session
            .outputs
            .iter()
            .find(|output| output.name == NerModel::OUTPUT_NAME)
            .or_else(|| session.outputs.first())
            .map(|output| output.name.clone())
            .context(NotFoundOutputSnafu {
                output_name: NerModel::OUTPUT_NAME,
            })?;

        info!(
            path = %model.path().display(),
            inputs = ?inputs.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
            output = %output_name,
            "Loaded NER session"
        );

        Ok(Self {
            session: Mutex::new(session),
            model,
            inputs,
            output_name,
        })
    }
}

fn input_tensor(
    values: &Array2<i64>,
    int32: bool,
) -> Result<SessionInputValue<'static>, RedactError> {
    if int32 {
        let narrowed = values.mapv(|v| v as i32);
        Ok(Tensor::from_array(narrowed)
            .context(TensorSnafu { stage: "input" })?
            .into())
    } else {
        Ok(Tensor::from_array(values.clone())
            .context(TensorSnafu { stage: "input" })?
            .into())
    }
}

impl OnnxSession<NerModel> for NerSession<NerModel> {
    type Source = Encoded;
    type Output = Array2<f32>;
    type Extra = ();

    fn preprocess(&self, encoded: &Encoded) -> Result<NerInput, RedactError> {
        let len = encoded.len().min(self.model.config().max_length);
        let row = |values: &[i64]| {
            Array2::from_shape_vec((1, len), values.iter().take(len).copied().collect())
                .context(ShapeSnafu { stage: "input" })
        };

        // Some exports expect segment ids even for single sequences.
        let type_ids = vec![0_i64; len];
        Ok(NerInput {
            input_ids: row(&encoded.ids)?,
            attention_mask: row(&encoded.attention_mask)?,
            token_type_ids: row(&type_ids)?,
        })
    }

    fn postprocess(&self, output: Array2<f32>, _extra: ()) -> Result<Self::Output, RedactError> {
        if output.nrows() == 0 || output.ncols() == 0 {
            return Err(RedactError::Inference {
                stage: "postprocess".to_string(),
                message: format!("empty logits of shape {:?}", output.shape()),
            });
        }
        Ok(output)
    }

    fn infer(&self, input: NerInput) -> Result<Array2<f32>, RedactError> {
        let inputs = self
            .inputs
            .iter()
            .map(|slot| {
                let values = match slot.role {
                    InputRole::Ids => &input.input_ids,
                    InputRole::Mask => &input.attention_mask,
                    InputRole::TypeIds => &input.token_type_ids,
                };
                Ok((slot.name.clone(), input_tensor(values, slot.int32)?))
            })
            .collect::<Result<Vec<_>, RedactError>>()?;

        let mut session = self.session.lock().map_err(|_| RedactError::Inference {
            stage: "lock".to_string(),
            message: "NER session lock poisoned".to_string(),
        })?;
        let outputs = session.run(inputs).context(OrtRunSnafu)?;

        let tensor = outputs
            .get(self.output_name.as_str())
            .context(NotFoundOutputSnafu {
                output_name: self.output_name.clone(),
            })?
            .try_extract_array::<f32>()
            .context(TensorSnafu { stage: "extract" })?;

        let shape = tensor.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(RedactError::Inference {
                stage: "extract".to_string(),
                message: format!("expected logits of shape [1, seq, labels], got {:?}", shape),
            });
        }
        debug!(?shape, "NER logits");

        let logits = tensor
            .to_shape((shape[1], shape[2]))
            .context(ShapeSnafu { stage: "output" })?
            .to_owned();
        Ok(logits)
    }
}

impl TokenClassifier for NerSession<NerModel> {
    fn logits(&self, encoded: &Encoded) -> Result<Array2<f32>, RedactError> {
        self.run(encoded, ())
    }
}
