//! Token-classification (NER) model: tokenizer, label table and ONNX session.

pub mod labels;
pub mod model;
pub mod session;
pub mod tokenizer;

pub use labels::LabelTable;
pub use model::{NerModel, NerModelConfig};
pub use session::{NerSession, TokenClassifier};
pub use tokenizer::{Encoded, HfTokenizer, SubwordTokenizer};
