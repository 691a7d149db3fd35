// Dataset configuration
//
// Loaded once per run from a JSON file, validated, and passed down by
// reference. Transform composition is part of validation so that a bad
// preprocessing section fails before any I/O happens.

use crate::error::CurateError;
use crate::pipeline::preprocess::{compose_transforms, ComposedTransform};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Class name written to the ledger for frames outside every labeled interval.
pub const BACKGROUND_CLASS: &str = "background";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LabelConfig {
    pub name: String,
    pub is_target: bool,
    pub sampling_frequency: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PreprocessingConfig {
    /// Transform name -> parameters, applied in file order.
    #[serde(default)]
    pub transformations: Map<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DataSplitConfig {
    pub test_size: f64,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DatasetConfig {
    pub labels: Vec<LabelConfig>,
    #[serde(default)]
    pub preprocessing: PreprocessingConfig,
    pub data_split: DataSplitConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        let mut transformations = Map::new();
        transformations.insert("img_size".to_string(), json!([48, 48]));

        Self {
            labels: vec![
                LabelConfig {
                    name: "rat".to_string(),
                    is_target: true,
                    sampling_frequency: 1,
                },
                LabelConfig {
                    name: "weta".to_string(),
                    is_target: true,
                    sampling_frequency: 1,
                },
                LabelConfig {
                    name: "millipede".to_string(),
                    is_target: true,
                    sampling_frequency: 2,
                },
            ],
            preprocessing: PreprocessingConfig { transformations },
            data_split: DataSplitConfig {
                test_size: 0.25,
                seed: 0,
            },
        }
    }
}

impl DatasetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: DatasetConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.validate()?;
        tracing::info!(
            "Loaded config {:?} with labels {:?}",
            path,
            config.label_names()
        );
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write config {:?}", path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CurateError> {
        if self.labels.is_empty() {
            return Err(CurateError::InvalidConfig(
                "at least one label must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            if label.name.trim().is_empty() {
                return Err(CurateError::InvalidConfig(
                    "label names must not be empty".to_string(),
                ));
            }
            if label.name == BACKGROUND_CLASS {
                return Err(CurateError::InvalidConfig(format!(
                    "'{}' is reserved for background frames",
                    BACKGROUND_CLASS
                )));
            }
            if !seen.insert(label.name.as_str()) {
                return Err(CurateError::InvalidConfig(format!(
                    "label '{}' is configured more than once",
                    label.name
                )));
            }
            if label.sampling_frequency == 0 {
                return Err(CurateError::InvalidConfig(format!(
                    "label '{}' has sampling_frequency 0",
                    label.name
                )));
            }
        }

        let test_size = self.data_split.test_size;
        if !(0.0..=1.0).contains(&test_size) {
            return Err(CurateError::InvalidSplitSize(test_size));
        }

        self.compose_transforms()?;
        Ok(())
    }

    pub fn compose_transforms(&self) -> Result<ComposedTransform, CurateError> {
        compose_transforms(&self.preprocessing.transformations)
    }

    pub fn label_names(&self) -> Vec<&str> {
        self.labels.iter().map(|l| l.name.as_str()).collect()
    }

    /// Classes offered when relabeling: every target label, then background.
    pub fn relabel_classes(&self) -> Vec<String> {
        self.labels
            .iter()
            .filter(|l| l.is_target)
            .map(|l| l.name.clone())
            .chain(std::iter::once(BACKGROUND_CLASS.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DatasetConfig::default();
        config.validate().unwrap();
        assert_eq!(config.label_names(), vec!["rat", "weta", "millipede"]);
        assert_eq!(config.labels[2].sampling_frequency, 2);
    }

    #[test]
    fn test_save_and_load_keeps_transform_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = DatasetConfig::default();
        config
            .preprocessing
            .transformations
            .insert("grayscale".to_string(), Value::Bool(true));
        config.save(&path).unwrap();

        let loaded = DatasetConfig::load(&path).unwrap();
        let names: Vec<&String> = loaded.preprocessing.transformations.keys().collect();
        assert_eq!(names, vec!["img_size", "grayscale"]);
    }

    #[test]
    fn test_unknown_transform_fails_validation() {
        let mut config = DatasetConfig::default();
        config
            .preprocessing
            .transformations
            .insert("sharpen".to_string(), json!(2));

        match config.validate() {
            Err(CurateError::UnknownTransform(name)) => assert_eq!(name, "sharpen"),
            other => panic!("expected UnknownTransform, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = DatasetConfig::default();
        config.labels[0].sampling_frequency = 0;
        assert!(matches!(
            config.validate(),
            Err(CurateError::InvalidConfig(_))
        ));

        let mut config = DatasetConfig::default();
        config.labels[1].name = "rat".to_string();
        assert!(matches!(
            config.validate(),
            Err(CurateError::InvalidConfig(_))
        ));

        let mut config = DatasetConfig::default();
        config.data_split.test_size = 1.5;
        assert!(matches!(
            config.validate(),
            Err(CurateError::InvalidSplitSize(_))
        ));
    }

    #[test]
    fn test_missing_key_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"labels": []}"#).unwrap();
        assert!(DatasetConfig::load(&path).is_err());
    }

    #[test]
    fn test_relabel_classes_skip_background_only_labels() {
        let mut config = DatasetConfig::default();
        config.labels.push(LabelConfig {
            name: "empty".to_string(),
            is_target: false,
            sampling_frequency: 1,
        });
        assert_eq!(
            config.relabel_classes(),
            vec!["rat", "weta", "millipede", "background"]
        );
    }
}
