use tracing::debug;

use crate::{analysis::bbox::Bbox, error::RedactError, text::span::EntitySpan};

use super::word::Word;

/// Separator inserted between consecutive words.
pub const WORD_SEPARATOR: char = ' ';

/// Where one word landed in the concatenated text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
    pub bbox: Bbox,
}

impl WordSpan {
    /// Open-interval overlap with `[start, end)`.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        !(self.end <= start || self.start >= end)
    }
}

/// Reading-order text of one image with provenance back to word boxes.
///
/// `spans` are disjoint and ordered by `start`; joining the indexed words with
/// [`WORD_SEPARATOR`] reproduces `full_text`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextIndex {
    pub full_text: String,
    pub spans: Vec<WordSpan>,
}

impl TextIndex {
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Checks that a span lies inside `full_text`.
    pub fn check_span(&self, span: &EntitySpan) -> Result<(), RedactError> {
        let len = self.full_text.len();
        if span.start > span.end || span.end > len {
            return Err(RedactError::InvalidSpan {
                start: span.start,
                end: span.end,
                len,
            });
        }
        Ok(())
    }

    /// Word spans overlapping `[start, end)`, in text order.
    pub fn overlapping(&self, start: usize, end: usize) -> impl Iterator<Item = &WordSpan> {
        self.spans.iter().filter(move |w| w.overlaps(start, end))
    }
}

/// Builds a [`TextIndex`] from OCR words.
pub struct WordIndexer;

impl WordIndexer {
    /// Sorts words top-to-bottom then left-to-right by their top-left corner
    /// and joins the trimmed non-empty texts with a single space.
    ///
    /// The sort is stable, so words sharing a corner keep their input order.
    /// Rows are not clustered: a word a pixel higher than its left neighbour
    /// sorts first, and multi-column layouts interleave.
    pub fn build(words: &[Word]) -> TextIndex {
        let mut ordered: Vec<&Word> = words.iter().collect();
        ordered.sort_by_key(|w| (w.bbox.min.y, w.bbox.min.x));

        let mut full_text = String::new();
        let mut spans = Vec::with_capacity(ordered.len());

        for word in ordered {
            let text = word.trimmed();
            if text.is_empty() {
                continue;
            }
            if !full_text.is_empty() {
                full_text.push(WORD_SEPARATOR);
            }
            let start = full_text.len();
            full_text.push_str(text);
            spans.push(WordSpan {
                start,
                end: full_text.len(),
                bbox: word.bbox,
            });
        }

        debug!(words = words.len(), indexed = spans.len(), "Built text index");

        TextIndex { full_text, spans }
    }
}
