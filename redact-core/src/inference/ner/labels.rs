use std::{collections::BTreeMap, fmt::Display, path::Path};

use serde::Deserialize;

use crate::{analysis::labels::DEFAULT_ID2LABEL, error::RedactError};

/// Maps model label ids to BIO tag strings.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    id2label: BTreeMap<usize, String>,
}

#[derive(Deserialize)]
struct HfConfig {
    #[serde(default)]
    id2label: BTreeMap<String, String>,
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::from_labels(DEFAULT_ID2LABEL)
    }
}

impl LabelTable {
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id2label: labels.into_iter().map(Into::into).enumerate().collect(),
        }
    }

    /// Resolves the table from `labels.txt`, then `config.json`'s `id2label`,
    /// then the CoNLL default when neither path is configured.
    ///
    /// A configured path that cannot be read or parsed, or that yields no
    /// labels, is an error rather than a silent fallback.
    pub fn load(
        labels_path: Option<&Path>,
        config_path: Option<&Path>,
    ) -> Result<Self, RedactError> {
        if let Some(path) = labels_path {
            let content = read_source(path)?;
            let table = Self::from_labels(
                content
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty()),
            );
            return table.non_empty(path);
        }

        if let Some(path) = config_path {
            let content = read_source(path)?;
            let config: HfConfig =
                serde_json::from_str(&content).map_err(|e| load_error(path, e))?;
            let id2label = config
                .id2label
                .into_iter()
                .map(|(id, label)| {
                    let parsed = id.parse::<usize>().map_err(|_| {
                        load_error(path, format!("label id `{}` is not an integer", id))
                    })?;
                    Ok::<_, RedactError>((parsed, label))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()?;
            return Self { id2label }.non_empty(path);
        }

        Ok(Self::default())
    }

    fn non_empty(self, path: &Path) -> Result<Self, RedactError> {
        if self.id2label.is_empty() {
            return Err(load_error(path, "contains no labels"));
        }
        Ok(self)
    }

    /// Tag for `id`; ids the table does not know are treated as `O`.
    pub fn label(&self, id: usize) -> &str {
        self.id2label.get(&id).map(String::as_str).unwrap_or("O")
    }

    pub fn len(&self) -> usize {
        self.id2label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id2label.is_empty()
    }
}

fn read_source(path: &Path) -> Result<String, RedactError> {
    std::fs::read_to_string(path).map_err(|e| load_error(path, e))
}

fn load_error(path: &Path, reason: impl Display) -> RedactError {
    RedactError::ModelLoad {
        stage: "label-table".to_string(),
        message: format!("{}: {}", path.display(), reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table() {
        let table = LabelTable::load(None, None).unwrap();
        assert_eq!(table.len(), 9);
        assert_eq!(table.label(0), "O");
        assert_eq!(table.label(3), "B-PER");
        assert_eq!(table.label(42), "O");
    }

    #[test]
    fn test_labels_txt_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let labels = dir.path().join("labels.txt");
        let config = dir.path().join("config.json");
        std::fs::write(&labels, "O\n\nB-LOC\nI-LOC\n").unwrap();
        std::fs::write(&config, r#"{"id2label": {"0": "O", "1": "B-PER"}}"#).unwrap();

        let table = LabelTable::load(Some(&labels), Some(&config)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.label(1), "B-LOC");
    }

    #[test]
    fn test_config_json_id2label() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{"id2label": {"0": "O", "2": "I-PER", "1": "B-PER"}}"#).unwrap();

        let table = LabelTable::load(None, Some(&config)).unwrap();
        assert_eq!(table.label(1), "B-PER");
        assert_eq!(table.label(2), "I-PER");
    }

    #[test]
    fn test_bad_label_sources_fail() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        assert!(matches!(
            LabelTable::load(Some(&missing), None),
            Err(RedactError::ModelLoad { .. })
        ));
        let missing_config = dir.path().join("missing.json");
        assert!(matches!(
            LabelTable::load(None, Some(&missing_config)),
            Err(RedactError::ModelLoad { .. })
        ));

        let config = dir.path().join("config.json");
        std::fs::write(&config, "not json").unwrap();
        assert!(matches!(
            LabelTable::load(None, Some(&config)),
            Err(RedactError::ModelLoad { .. })
        ));

        std::fs::write(&config, r#"{"id2label": {}}"#).unwrap();
        assert!(matches!(
            LabelTable::load(None, Some(&config)),
            Err(RedactError::ModelLoad { .. })
        ));

        let empty = dir.path().join("labels.txt");
        std::fs::write(&empty, "\n\n").unwrap();
        assert!(matches!(
            LabelTable::load(Some(&empty), None),
            Err(RedactError::ModelLoad { .. })
        ));
    }
}
