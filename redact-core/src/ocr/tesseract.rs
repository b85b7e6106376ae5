use std::{
    io::{Cursor, Write},
    process::{Command, Stdio},
};

use image::{ImageFormat, RgbImage};
use snafu::ResultExt;
use tracing::debug;

use crate::{
    analysis::bbox::Bbox,
    error::{ImageEncodeSnafu, IoSnafu, RedactError},
    text::Word,
};

use super::OcrEngine;

const TSV_COLUMNS: usize = 12;
const COL_LEFT: usize = 6;
const COL_CONF: usize = 10;
const COL_TEXT: usize = 11;

/// Parses Tesseract `image_to_data` TSV output into words.
///
/// Columns: `level page_num block_num par_num line_num word_num left top width
/// height conf text`. Rows without text are skipped, as are rows scored
/// `0 <= conf < min_confidence`; `conf = -1` rows are kept.
pub fn parse_tsv(tsv: &str, min_confidence: i32) -> Result<Vec<Word>, RedactError> {
    let mut words = Vec::new();

    for (idx, line) in tsv.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() || line.starts_with("level") {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < TSV_COLUMNS - 1 {
            return Err(RedactError::OcrParse {
                line: line_no,
                message: format!("expected {} columns, got {}", TSV_COLUMNS, fields.len()),
            });
        }

        let text = fields.get(COL_TEXT).map(|t| t.trim()).unwrap_or_default();
        if text.is_empty() {
            continue;
        }

        let number = |col: usize| -> Result<f32, RedactError> {
            fields[col].trim().parse::<f32>().map_err(|_| RedactError::OcrParse {
                line: line_no,
                message: format!("column {} is not a number: `{}`", col + 1, fields[col]),
            })
        };
        let confidence = number(COL_CONF)? as i32;
        if (0..min_confidence).contains(&confidence) {
            continue;
        }

        let [left, top, width, height] = [
            number(COL_LEFT)?,
            number(COL_LEFT + 1)?,
            number(COL_LEFT + 2)?,
            number(COL_LEFT + 3)?,
        ]
        .map(|v| v as i32);

        words.push(Word::new(text, confidence, Bbox::from_ltwh(left, top, width, height)));
    }

    Ok(words)
}

/// Runs the `tesseract` binary on each image and parses its TSV output.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    min_confidence: i32,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, min_confidence: i32) -> Self {
        Self {
            command: command.into(),
            min_confidence,
        }
    }
}

impl OcrEngine for TesseractCli {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn extract_words(&self, image: &RgbImage) -> Result<Vec<Word>, RedactError> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .context(ImageEncodeSnafu)?;

        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context(IoSnafu {
                path: self.command.clone(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(png.get_ref()).context(IoSnafu {
                path: self.command.clone(),
            })?;
        }
        let output = child.wait_with_output().context(IoSnafu {
            path: self.command.clone(),
        })?;
        if !output.status.success() {
            return Err(RedactError::Inference {
                stage: "ocr".to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let words = parse_tsv(&String::from_utf8_lossy(&output.stdout), self.min_confidence)?;
        debug!(words = words.len(), "Tesseract finished");
        Ok(words)
    }
}
