use regex::{Regex, RegexBuilder};
use snafu::ResultExt;

use crate::{
    error::{PatternSnafu, RedactError},
    text::{EntitySet, EntitySpan},
};

use super::Recognizer;

/// Flags configured terms wherever they occur as whole words, case-insensitively.
pub struct DenyListRecognizer {
    entity: String,
    regex: Option<Regex>,
}

impl DenyListRecognizer {
    pub fn new<I, S>(entity: impl Into<String>, terms: I) -> Result<Self, RedactError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty())
            .map(|t| regex::escape(&t))
            .collect();

        let regex = if alternatives.is_empty() {
            None
        } else {
            let source = format!(r"\b(?:{})\b", alternatives.join("|"));
            Some(
                RegexBuilder::new(&source)
                    .case_insensitive(true)
                    .build()
                    .context(PatternSnafu { name: "deny_list" })?,
            )
        };

        Ok(Self {
            entity: entity.into(),
            regex,
        })
    }
}

impl Recognizer for DenyListRecognizer {
    fn name(&self) -> &str {
        "deny_list"
    }

    fn produce_spans(
        &self,
        text: &str,
        entities: &EntitySet,
    ) -> Result<Vec<EntitySpan>, RedactError> {
        let Some(regex) = &self.regex else {
            return Ok(Vec::new());
        };
        if !entities.contains(&self.entity) {
            return Ok(Vec::new());
        }
        Ok(regex
            .find_iter(text)
            .map(|m| EntitySpan::new(&self.entity, m.start(), m.end(), 1.0, "deny_list"))
            .collect())
    }
}
