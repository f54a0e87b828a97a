use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ImportError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSettings {
    #[serde(default = "default_max_input_bytes")]
    pub max_input_bytes: usize,
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "default_detect_scan_lines")]
    pub detect_scan_lines: usize,
    #[serde(default = "default_note_separator")]
    pub note_separator: String,
    #[serde(default = "default_true")]
    pub source_tag_enabled: bool,
}

fn default_max_input_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_max_rows() -> usize {
    10_000
}

fn default_detect_scan_lines() -> usize {
    30
}

fn default_note_separator() -> String {
    " | ".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_input_bytes: default_max_input_bytes(),
            max_rows: default_max_rows(),
            detect_scan_lines: default_detect_scan_lines(),
            note_separator: default_note_separator(),
            source_tag_enabled: default_true(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("billport")
}

pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

pub fn load_settings() -> ImportSettings {
    load_settings_from(&settings_path())
}

/// Missing or unreadable files fall back to defaults.
pub fn load_settings_from(path: &Path) -> ImportSettings {
    if !path.exists() {
        return ImportSettings::default();
    }
    let content = std::fs::read_to_string(path).unwrap_or_default();
    serde_json::from_str(&content).unwrap_or_default()
}

pub fn save_settings(settings: &ImportSettings) -> Result<()> {
    save_settings_to(settings, &settings_path())
}

pub fn save_settings_to(settings: &ImportSettings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ImportError::Settings(e.to_string()))?;
    std::fs::write(path, format!("{json}\n"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("settings.json");
        let settings = ImportSettings {
            max_rows: 50,
            note_separator: " / ".to_string(),
            ..ImportSettings::default()
        };
        save_settings_to(&settings, &path).unwrap();
        assert!(path.exists());
        assert_eq!(load_settings_from(&path), settings);
    }

    #[test]
    fn test_load_returns_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let s = load_settings_from(&dir.path().join("nope.json"));
        assert_eq!(s.max_input_bytes, 10_485_760);
        assert_eq!(s.max_rows, 10_000);
        assert_eq!(s.detect_scan_lines, 30);
        assert!(s.source_tag_enabled);
    }

    #[test]
    fn test_load_merges_with_defaults() {
        let json = r#"{"max_rows": 200, "source_tag_enabled": false}"#;
        let s: ImportSettings = serde_json::from_str(json).unwrap();
        assert_eq!(s.max_rows, 200);
        assert!(!s.source_tag_enabled);
        assert_eq!(s.note_separator, " | ");
        assert_eq!(s.detect_scan_lines, 30);
    }

    #[test]
    fn test_load_garbage_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_settings_from(&path), ImportSettings::default());
    }
}
