use regex::Regex;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use crate::{
    analysis::{
        bbox::Bbox,
        region::{BoxSource, Region},
    },
    error::{PatternSnafu, RedactError},
    text::{EntitySet, EntitySpan, Word},
};

use super::Recognizer;

/// A user-supplied pattern from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    pub name: String,
    pub entity: String,
    pub regex: String,
    pub score: f32,
}

/// One compiled pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub name: String,
    pub entity: String,
    pub regex: Regex,
    pub score: f32,
    validator: Option<fn(&str) -> bool>,
}

impl Pattern {
    pub fn new(
        name: impl Into<String>,
        entity: impl Into<String>,
        regex: &str,
        score: f32,
    ) -> Result<Self, RedactError> {
        let name = name.into();
        let regex = Regex::new(regex).context(PatternSnafu { name: name.clone() })?;
        Ok(Self {
            name,
            entity: entity.into(),
            regex,
            score,
            validator: None,
        })
    }

    fn with_validator(mut self, validator: fn(&str) -> bool) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Matches in `text` that pass the pattern's validator.
    pub fn matches<'t>(&'t self, text: &'t str) -> impl Iterator<Item = regex::Match<'t>> + 't {
        self.regex
            .find_iter(text)
            .filter(move |m| self.validator.is_none_or(|validate| validate(m.as_str())))
    }
}

const BUILTIN: [(&str, &str, &str, f32); 6] = [
    (
        "email",
        "EMAIL_ADDRESS",
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
        1.0,
    ),
    (
        "phone",
        "PHONE_NUMBER",
        r"(?:\+?1[\s.-]?)?\(?\b\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
        0.7,
    ),
    ("credit_card", "CREDIT_CARD", r"\b(?:\d[ -]?){12,18}\d\b", 1.0),
    ("us_ssn", "US_SSN", r"\b\d{3}-\d{2}-\d{4}\b", 0.85),
    (
        "ipv4",
        "IP_ADDRESS",
        r"\b(?:(?:25[0-5]|2[0-4]\d|1?\d?\d)\.){3}(?:25[0-5]|2[0-4]\d|1?\d?\d)\b",
        0.95,
    ),
    ("url", "URL", r"\b(?:https?://|www\.)[^\s]+", 0.6),
];

/// Compiled patterns shared by the text-level and word-level matchers.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in patterns for common structured identifiers.
    pub fn builtin() -> Result<Self, RedactError> {
        let patterns = BUILTIN
            .iter()
            .map(|&(name, entity, regex, score)| {
                let pattern = Pattern::new(name, entity, regex, score)?;
                Ok(if entity == "CREDIT_CARD" {
                    pattern.with_validator(luhn_valid)
                } else {
                    pattern
                })
            })
            .collect::<Result<Vec<_>, RedactError>>()?;
        Ok(Self { patterns })
    }

    /// Built-ins followed by the configured patterns.
    pub fn with_custom(custom: &[PatternConfig]) -> Result<Self, RedactError> {
        let mut set = Self::builtin()?;
        for config in custom {
            set.push(Pattern::new(&config.name, &config.entity, &config.regex, config.score)?);
        }
        Ok(set)
    }

    pub fn push(&mut self, pattern: Pattern) {
        self.patterns.push(pattern);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Luhn checksum over the digits of `candidate`, ignoring separators.
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

/// Regex recognizer over the reading-order text. Matches may span words.
pub struct PatternRecognizer {
    patterns: PatternSet,
    min_score: f32,
}

impl PatternRecognizer {
    pub fn new(patterns: PatternSet, min_score: f32) -> Self {
        Self {
            patterns,
            min_score,
        }
    }
}

impl Recognizer for PatternRecognizer {
    fn name(&self) -> &str {
        "pattern"
    }

    fn produce_spans(
        &self,
        text: &str,
        entities: &EntitySet,
    ) -> Result<Vec<EntitySpan>, RedactError> {
        let spans = self
            .patterns
            .iter()
            .filter(|p| p.score >= self.min_score && entities.contains(&p.entity))
            .flat_map(|p| {
                p.matches(text).map(move |m| {
                    EntitySpan::new(&p.entity, m.start(), m.end(), p.score, "pattern")
                })
            })
            .collect();
        Ok(spans)
    }
}

/// A word-level pattern hit, carrying the OCR word box as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternHit {
    pub label: String,
    pub text: String,
    pub bbox: Bbox,
    pub confidence: f32,
}

impl From<PatternHit> for Region {
    fn from(hit: PatternHit) -> Self {
        Region::new(hit.bbox, hit.label, Some(hit.confidence), BoxSource::Pattern)
    }
}

/// Runs patterns over individual OCR words, bypassing the text index.
pub struct WordPatternMatcher {
    min_score: f32,
}

impl WordPatternMatcher {
    pub fn new(min_score: f32) -> Self {
        Self { min_score }
    }

    /// The highest scoring requested pattern per word, if any.
    pub fn find(
        &self,
        words: &[Word],
        patterns: &PatternSet,
        entities: &EntitySet,
    ) -> Vec<PatternHit> {
        words
            .iter()
            .filter_map(|word| {
                let text = word.trimmed();
                if text.is_empty() {
                    return None;
                }
                patterns
                    .iter()
                    .filter(|p| p.score >= self.min_score && entities.contains(&p.entity))
                    .filter(|p| p.matches(text).next().is_some())
                    .max_by(|a, b| a.score.total_cmp(&b.score))
                    .map(|p| PatternHit {
                        label: p.entity.clone(),
                        text: text.to_string(),
                        bbox: word.bbox,
                        confidence: p.score,
                    })
            })
            .collect()
    }
}
