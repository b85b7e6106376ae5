use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A typed entity found in the indexed text.
///
/// `start..end` is a half-open UTF-8 byte range into the text the recognizer
/// was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpan {
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
    /// Name of the recognizer that produced the span.
    pub recognizer: String,
}

impl EntitySpan {
    pub fn new(
        entity_type: impl Into<String>,
        start: usize,
        end: usize,
        confidence: f32,
        recognizer: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            start,
            end,
            confidence,
            recognizer: recognizer.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The entity types a caller asks recognizers for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitySet(BTreeSet<String>);

impl EntitySet {
    pub fn new<I, S>(entities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(entities.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.0.contains(entity_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}
