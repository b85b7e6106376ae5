use std::path::{Path, PathBuf};

use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use crate::error::RedactError;

/// Files a tokenizer directory must carry.
pub const REQUIRED_TOKENIZER_FILES: [&str; 1] = ["tokenizer.json"];

/// A tokenized sequence ready for the classifier.
///
/// `offsets[i]` is the byte range of token `i` in the source text; special
/// tokens carry an empty range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoded {
    pub ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub type_ids: Vec<i64>,
    pub offsets: Vec<(usize, usize)>,
}

impl Encoded {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub trait SubwordTokenizer: Send + Sync {
    /// Tokenizes `text`, truncated to the tokenizer's maximum length.
    fn encode(&self, text: &str) -> Result<Encoded, RedactError>;
}

/// HuggingFace `tokenizer.json` tokenizer.
pub struct HfTokenizer {
    tokenizer: Tokenizer,
    max_length: usize,
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer")
            .field("max_length", &self.max_length)
            .finish_non_exhaustive()
    }
}

impl HfTokenizer {
    /// Loads a tokenizer from a `tokenizer.json` file or a directory holding one.
    pub fn from_path(path: &Path, max_length: usize) -> Result<Self, RedactError> {
        let file = resolve_tokenizer_file(path)?;

        let mut tokenizer = Tokenizer::from_file(&file).map_err(|e| RedactError::ModelLoad {
            stage: "tokenizer".to_string(),
            message: format!("{}: {}", file.display(), e),
        })?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| RedactError::ModelLoad {
                stage: "tokenizer-truncation".to_string(),
                message: e.to_string(),
            })?;

        info!(path = %file.display(), max_length, "Loaded tokenizer");
        Ok(Self {
            tokenizer,
            max_length,
        })
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl SubwordTokenizer for HfTokenizer {
    fn encode(&self, text: &str) -> Result<Encoded, RedactError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| RedactError::Tokenize {
                stage: "encode".to_string(),
                message: e.to_string(),
            })?;

        let widen = |values: &[u32]| values.iter().map(|&v| v as i64).collect::<Vec<_>>();
        Ok(Encoded {
            ids: widen(encoding.get_ids()),
            attention_mask: widen(encoding.get_attention_mask()),
            type_ids: widen(encoding.get_type_ids()),
            offsets: encoding.get_offsets().to_vec(),
        })
    }
}

fn resolve_tokenizer_file(path: &Path) -> Result<PathBuf, RedactError> {
    if path.is_dir() {
        let missing: Vec<&str> = REQUIRED_TOKENIZER_FILES
            .iter()
            .copied()
            .filter(|name| {
                let file = path.join(name);
                !file.is_file() || file.metadata().map(|m| m.len() == 0).unwrap_or(true)
            })
            .collect();
        if !missing.is_empty() {
            return Err(RedactError::ModelLoad {
                stage: "tokenizer".to_string(),
                message: format!("missing or empty {:?} in {}", missing, path.display()),
            });
        }
        return Ok(path.join(REQUIRED_TOKENIZER_FILES[0]));
    }
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    Err(RedactError::ModelLoad {
        stage: "tokenizer".to_string(),
        message: format!("tokenizer path `{}` not found", path.display()),
    })
}
