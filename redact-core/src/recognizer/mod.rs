//! Span-producing recognizers and the registry that runs them.
//!
//! Every recognizer sees the same reading-order text and returns
//! [`EntitySpan`]s for the entity types it was asked for. The registry runs all
//! of them and concatenates the results; a recognizer that fails contributes
//! nothing and its failure is recorded in the outcome list.

pub mod deny_list;
pub mod pattern;
pub mod tagger;

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    error::RedactError,
    text::{EntitySet, EntitySpan},
};

pub use deny_list::DenyListRecognizer;
pub use pattern::{PatternHit, PatternRecognizer, PatternSet, WordPatternMatcher};
pub use tagger::{SequenceTagger, TaggerConfig};

pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    fn produce_spans(
        &self,
        text: &str,
        entities: &EntitySet,
    ) -> Result<Vec<EntitySpan>, RedactError>;
}

impl<R: Recognizer + ?Sized> Recognizer for Arc<R> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn produce_spans(
        &self,
        text: &str,
        entities: &EntitySet,
    ) -> Result<Vec<EntitySpan>, RedactError> {
        (**self).produce_spans(text, entities)
    }
}

/// What one recognizer contributed to an analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecognizerOutcome {
    Ok { name: String, spans: usize },
    Failed { name: String, reason: String },
}

impl RecognizerOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, RecognizerOutcome::Ok { .. })
    }
}

/// Spans from every recognizer plus a per-recognizer outcome.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub spans: Vec<EntitySpan>,
    pub outcomes: Vec<RecognizerOutcome>,
}

#[derive(Default)]
pub struct RecognizerRegistry {
    recognizers: Vec<Box<dyn Recognizer>>,
}

impl RecognizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, recognizer: impl Recognizer + 'static) -> &mut Self {
        self.recognizers.push(Box::new(recognizer));
        self
    }

    pub fn add_boxed(&mut self, recognizer: Box<dyn Recognizer>) -> &mut Self {
        self.recognizers.push(recognizer);
        self
    }

    pub fn len(&self) -> usize {
        self.recognizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recognizers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.recognizers.iter().map(|r| r.name()).collect()
    }

    /// Concatenated spans of every recognizer, in registration order.
    pub fn analyze(&self, text: &str, entities: &EntitySet) -> Vec<EntitySpan> {
        self.analyze_with_outcomes(text, entities).spans
    }

    /// Runs every recognizer, isolating failures.
    ///
    /// Spans are not deduplicated: two recognizers reporting the same range
    /// both keep their entity type and confidence.
    pub fn analyze_with_outcomes(&self, text: &str, entities: &EntitySet) -> Analysis {
        let mut analysis = Analysis::default();
        if text.is_empty() || entities.is_empty() {
            return analysis;
        }

        for recognizer in &self.recognizers {
            let name = recognizer.name().to_string();
            match recognizer.produce_spans(text, entities) {
                Ok(spans) => {
                    debug!(recognizer = %name, spans = spans.len(), "Recognizer finished");
                    analysis.outcomes.push(RecognizerOutcome::Ok {
                        name,
                        spans: spans.len(),
                    });
                    analysis.spans.extend(spans);
                }
                Err(err) => {
                    warn!(recognizer = %name, "Recognizer failed, skipping: {}", err);
                    analysis.outcomes.push(RecognizerOutcome::Failed {
                        name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        analysis
    }
}
