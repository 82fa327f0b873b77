use crate::config::{LabelsConfig, Validatable};
use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

const DEFAULT_EMOTION_CLASSES: [&str; 7] = [
    "neutral",
    "happy",
    "sad",
    "angry",
    "surprised",
    "disgust",
    "fear",
];

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] io::Error),
    #[error("Labels file {0:?} does not contain any label")]
    Empty(std::path::PathBuf),
}

/// A class index paired with its resolved name, as sent to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmotionLabel {
    pub index: usize,
    pub name: String,
}

/// Ordered table mapping model class indices to emotion names.
#[derive(Debug, Clone, PartialEq)]
pub struct EmotionClasses {
    labels: Vec<String>,
}

impl Default for EmotionClasses {
    fn default() -> Self {
        Self::new(DEFAULT_EMOTION_CLASSES.iter().map(|s| s.to_string()).collect())
    }
}

impl EmotionClasses {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Loads the table from configuration, or falls back to the built-in classes.
    pub fn from_config(labels_cfg: Option<&LabelsConfig>) -> Result<Self, LabelsError> {
        match labels_cfg {
            Some(cfg) => {
                let classes = load_labels(&cfg.get_path())?;
                tracing::info!(
                    "Loaded {} emotion classes from {:?}",
                    classes.len(),
                    cfg.get_path()
                );
                Ok(classes)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Unknown indices resolve to their decimal form.
    pub fn name_of(&self, index: usize) -> String {
        match self.get(index) {
            Some(name) => name.to_string(),
            None => index.to_string(),
        }
    }

    pub fn resolve(&self, index: usize) -> EmotionLabel {
        EmotionLabel {
            index,
            name: self.name_of(index),
        }
    }
}

/// One label per line; surrounding whitespace and blank lines are ignored.
pub fn load_labels(filepath: &Path) -> Result<EmotionClasses, LabelsError> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let label = line.trim();
        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    if labels.is_empty() {
        return Err(LabelsError::Empty(filepath.to_path_buf()));
    }

    Ok(EmotionClasses::new(labels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_table() {
        let classes = EmotionClasses::default();
        assert_eq!(classes.len(), 7);
        assert_eq!(classes.get(0), Some("neutral"));
        assert_eq!(classes.get(6), Some("fear"));
    }

    #[test]
    fn test_resolve_in_bounds() {
        let classes = EmotionClasses::default();
        assert_eq!(
            classes.resolve(1),
            EmotionLabel {
                index: 1,
                name: "happy".to_string()
            }
        );
    }

    #[test]
    fn test_resolve_out_of_bounds_uses_index() {
        let classes = EmotionClasses::default();
        assert_eq!(classes.name_of(7), "7");
        assert_eq!(classes.resolve(42).name, "42");
    }

    #[test]
    fn test_load_labels_skips_blank_lines() {
        let path = std::env::temp_dir().join(format!("emotion_labels_{}.txt", std::process::id()));
        {
            let mut file = File::create(&path).unwrap();
            writeln!(file, "calm\n\n  excited  \n").unwrap();
        }

        let classes = load_labels(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(classes, EmotionClasses::new(vec!["calm".into(), "excited".into()]));
    }

    #[test]
    fn test_from_config_without_labels_uses_defaults() {
        let classes = EmotionClasses::from_config(None).unwrap();
        assert_eq!(classes, EmotionClasses::default());
    }

    #[test]
    fn test_missing_labels_file() {
        let cfg = LabelsConfig {
            labels_dir: "./dummy_labels_dir".into(),
            labels_file: "dummy_labels.txt".to_string(),
        };
        assert!(matches!(
            EmotionClasses::from_config(Some(&cfg)),
            Err(LabelsError::Io(_))
        ));
    }
}
