use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::info;

use crate::{
    analysis::labels::EntityGroup,
    error::{ConfigParseSnafu, IoSnafu, RedactError},
    inference::plate::PlateConfig,
    ocr::OcrConfig,
    recognizer::{TaggerConfig, pattern::PatternConfig},
    render::RedactionConfig,
    text::EntitySet,
};

/// Entity types recognized by the built-in patterns.
pub const PATTERN_ENTITIES: [&str; 6] = [
    "EMAIL_ADDRESS",
    "PHONE_NUMBER",
    "CREDIT_CARD",
    "US_SSN",
    "IP_ADDRESS",
    "URL",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizersConfig {
    /// Entity types requested from every recognizer.
    pub entities: Vec<String>,
    /// Pattern scores below this are ignored.
    pub min_score: f32,
    pub deny_list: Vec<String>,
    pub deny_list_entity: String,
    pub patterns: Vec<PatternConfig>,
}

impl Default for RecognizersConfig {
    fn default() -> Self {
        Self {
            entities: EntityGroup::all()
                .iter()
                .map(|g| g.name())
                .chain(PATTERN_ENTITIES)
                .map(String::from)
                .collect(),
            min_score: 0.6,
            deny_list: Vec::new(),
            deny_list_entity: EntityGroup::Person.name().to_string(),
            patterns: Vec::new(),
        }
    }
}

impl RecognizersConfig {
    pub fn entity_set(&self) -> EntitySet {
        EntitySet::new(self.entities.iter().cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    pub input_dir: PathBuf,
    pub results_img_dir: PathBuf,
    pub results_rpt_dir: PathBuf,
    pub jpeg_quality: u8,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("resources/images"),
            results_img_dir: PathBuf::from("resources/outputs/images"),
            results_rpt_dir: PathBuf::from("resources/reports"),
            jpeg_quality: 90,
        }
    }
}

/// Everything the redactor reads, one TOML section per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactorConfig {
    pub ocr: OcrConfig,
    pub plate: PlateConfig,
    pub tagger: TaggerConfig,
    pub recognizers: RecognizersConfig,
    pub redaction: RedactionConfig,
    pub io: IoConfig,
}

impl RedactorConfig {
    pub fn from_file(path: &Path) -> Result<Self, RedactError> {
        let content = std::fs::read_to_string(path).context(IoSnafu {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self, RedactError> {
        toml::from_str(content).context(ConfigParseSnafu {
            path: path.display().to_string(),
        })
    }

    /// File configuration (or defaults when `path` is `None`) with
    /// environment overrides applied on top.
    pub fn load(path: Option<&Path>) -> Result<Self, RedactError> {
        let mut config = match path {
            Some(path) => {
                let config = Self::from_file(path)?;
                info!(path = %path.display(), "Loaded configuration");
                config
            }
            None => Self::default(),
        };
        config.tagger.apply_env()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use crate::render::RedactionMode;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = RedactorConfig::default();
        assert_eq!(config.ocr.min_confidence, 50);
        assert_eq!(config.plate.score_threshold, 0.25);
        assert_eq!(config.tagger.max_length, 256);
        assert_eq!(config.tagger.score_threshold, 0.60);
        assert_eq!(config.redaction.mode, RedactionMode::Fill);
        assert_eq!(config.io.jpeg_quality, 90);

        let entities = config.recognizers.entity_set();
        assert!(entities.contains("PERSON"));
        assert!(entities.contains("NRP"));
        assert!(entities.contains("CREDIT_CARD"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("redact.toml");
        std::fs::write(
            &path,
            r#"
[redaction]
mode = "blur"
pad = 4

[recognizers]
deny_list = ["Project Falcon"]

[[recognizers.patterns]]
name = "badge"
entity = "BADGE_ID"
regex = 'B-\d{6}'
score = 0.9

[plate.labels]
0 = "plate"
"#,
        )
        .unwrap();

        let config = RedactorConfig::from_file(&path).unwrap();
        assert_eq!(config.redaction.mode, RedactionMode::Blur);
        assert_eq!(config.redaction.pad, 4);
        assert_eq!(config.redaction.blur_kernel_size, 23);
        assert_eq!(config.recognizers.deny_list, vec!["Project Falcon".to_string()]);
        assert_eq!(config.recognizers.patterns[0].entity, "BADGE_ID");
        assert_eq!(config.recognizers.min_score, 0.6);
        assert_eq!(config.plate.label(0), "plate");
        assert_eq!(config.ocr.min_confidence, 50);
    }

    #[test]
    fn test_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            RedactorConfig::from_file(&missing),
            Err(RedactError::Io { .. })
        ));

        let broken = dir.path().join("broken.toml");
        std::fs::write(&broken, "[redaction\nmode = 1").unwrap();
        assert!(matches!(
            RedactorConfig::from_file(&broken),
            Err(RedactError::ConfigParse { .. })
        ));

        let wrong_mode = dir.path().join("mode.toml");
        std::fs::write(&wrong_mode, "[redaction]\nmode = \"pixelate\"").unwrap();
        assert!(RedactorConfig::from_file(&wrong_mode).is_err());
    }
}
