//! Persistent application settings.
//!
//! Stored as JSON at `<config_dir>/dentascribe/settings.json`. Unknown or
//! missing fields fall back to defaults so older settings files keep working.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const SETTINGS_FILE_NAME: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Recordings shorter than this are never sent to OpenAI.
    pub min_transcribe_ms: u64,

    /// Whisper model used for transcription.
    pub whisper_model: String,

    /// Chat model used for SOAP note generation.
    pub chat_model: String,

    /// Sampling temperature for note generation.
    pub temperature: f32,

    /// Directory for archived transcripts and saved notes.
    /// Defaults to the user documents directory when unset.
    pub output_dir: Option<PathBuf>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            min_transcribe_ms: 500,
            whisper_model: "whisper-1".to_string(),
            chat_model: "gpt-4.1-2025-04-14".to_string(),
            temperature: 0.4,
            output_dir: None,
        }
    }
}

fn settings_path() -> Result<PathBuf, String> {
    let dir = dirs::config_dir().ok_or("Could not determine config directory")?;
    Ok(dir.join("dentascribe").join(SETTINGS_FILE_NAME))
}

pub fn load_settings() -> AppSettings {
    let path = match settings_path() {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("settings: {}", e);
            return AppSettings::default();
        }
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<AppSettings>(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!("settings: failed to parse {:?}: {}", path, e);
                AppSettings::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppSettings::default(),
        Err(e) => {
            tracing::warn!("settings: failed to read {:?}: {}", path, e);
            AppSettings::default()
        }
    }
}

pub fn save_settings(settings: &AppSettings) -> Result<(), String> {
    let path = settings_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory {:?}: {}", parent, e))?;
    }

    let contents =
        serde_json::to_string_pretty(settings).map_err(|e| format!("Serialize settings: {}", e))?;

    // Write atomically: write to a temp file in the same directory, then rename.
    // This prevents partial/corrupt settings.json if the process dies mid-write.
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &contents)
        .map_err(|e| format!("Write temp settings {:?}: {}", tmp_path, e))?;

    // On Unix, rename will atomically replace the destination. On Windows, rename
    // fails if the destination exists, so we remove it first (ignoring NotFound).
    if cfg!(windows) {
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(format!("Remove existing settings file {:?}: {}", path, e));
                }
            }
        }
    }

    std::fs::rename(&tmp_path, &path)
        .map_err(|e| format!("Rename temp settings {:?} to {:?}: {}", tmp_path, path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_sensible() {
        let settings = AppSettings::default();
        assert_eq!(settings.min_transcribe_ms, 500);
        assert_eq!(settings.whisper_model, "whisper-1");
        assert_eq!(settings.chat_model, "gpt-4.1-2025-04-14");
        assert!((settings.temperature - 0.4).abs() < f32::EPSILON);
        assert!(settings.output_dir.is_none());
    }

    #[test]
    fn json_round_trip() {
        let mut settings = AppSettings::default();
        settings.output_dir = Some(PathBuf::from("/tmp/notes"));
        settings.temperature = 0.2;

        let json = serde_json::to_string(&settings).unwrap();
        let parsed: AppSettings = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.output_dir, Some(PathBuf::from("/tmp/notes")));
        assert!((parsed.temperature - 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn partial_settings_file_fills_in_defaults() {
        let parsed: AppSettings = serde_json::from_str(r#"{"chat_model":"gpt-4o"}"#).unwrap();
        assert_eq!(parsed.chat_model, "gpt-4o");
        assert_eq!(parsed.whisper_model, "whisper-1");
        assert_eq!(parsed.min_transcribe_ms, 500);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let parsed: Result<AppSettings, _> =
            serde_json::from_str(r#"{"min_transcribe_ms": 750, "legacy_field": true}"#);
        let settings = parsed.unwrap();
        assert_eq!(settings.min_transcribe_ms, 750);
    }
}
