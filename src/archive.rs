//! Flat-file persistence for transcripts and notes.
//!
//! Transcripts are written to `conversation_<timestamp>.txt` as soon as
//! transcription completes; notes are saved to `soap_note_<timestamp>.md`
//! on demand. Files land in the configured output directory, falling back
//! to the user documents directory.

use std::path::{Path, PathBuf};

use crate::settings::AppSettings;

pub const TRANSCRIPT_PREFIX: &str = "conversation_";
pub const NOTE_PREFIX: &str = "soap_note_";

#[derive(Debug)]
pub enum ArchiveError {
    /// The requested transcript file does not exist.
    NotFound(PathBuf),
    Io { path: PathBuf, detail: String },
}

impl std::fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArchiveError::NotFound(path) => {
                write!(f, "Transcript file not found: {}", path.display())
            }
            ArchiveError::Io { path, detail } => {
                write!(f, "File error for {}: {}", path.display(), detail)
            }
        }
    }
}

impl std::error::Error for ArchiveError {}

/// Resolve the directory transcripts and notes are written to.
pub fn output_dir(settings: &AppSettings) -> PathBuf {
    settings
        .output_dir
        .clone()
        .or_else(dirs::document_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

fn write_timestamped(
    settings: &AppSettings,
    prefix: &str,
    extension: &str,
    contents: &str,
) -> Result<PathBuf, ArchiveError> {
    let dir = output_dir(settings);
    std::fs::create_dir_all(&dir).map_err(|e| ArchiveError::Io {
        path: dir.clone(),
        detail: e.to_string(),
    })?;

    let path = dir.join(format!("{}{}.{}", prefix, timestamp(), extension));
    std::fs::write(&path, contents).map_err(|e| ArchiveError::Io {
        path: path.clone(),
        detail: e.to_string(),
    })?;

    tracing::info!(path = %path.display(), chars = contents.len(), "archived");
    Ok(path)
}

/// Write the transcript to a timestamped .txt file. Returns the path.
pub fn save_transcript(settings: &AppSettings, text: &str) -> Result<PathBuf, ArchiveError> {
    write_timestamped(settings, TRANSCRIPT_PREFIX, "txt", text)
}

/// Write the SOAP note to a timestamped .md file. Returns the path.
pub fn save_note(settings: &AppSettings, note: &str) -> Result<PathBuf, ArchiveError> {
    write_timestamped(settings, NOTE_PREFIX, "md", note)
}

/// Load a transcript from a file, with a clean not-found error.
pub fn load_transcript(path: &Path) -> Result<String, ArchiveError> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ArchiveError::NotFound(path.to_path_buf()))
        }
        Err(e) => Err(ArchiveError::Io {
            path: path.to_path_buf(),
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_in(dir: &Path) -> AppSettings {
        AppSettings {
            output_dir: Some(dir.to_path_buf()),
            ..AppSettings::default()
        }
    }

    #[test]
    fn transcript_filename_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path());

        let path = save_transcript(&settings, "patient reports molar pain").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert!(name.starts_with(TRANSCRIPT_PREFIX));
        assert!(name.ends_with(".txt"));
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "patient reports molar pain"
        );
    }

    #[test]
    fn note_filename_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = settings_in(tmp.path());

        let path = save_note(&settings, "### Subjective:\n- pain").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();

        assert!(name.starts_with(NOTE_PREFIX));
        assert!(name.ends_with(".md"));
    }

    #[test]
    fn load_missing_transcript_is_a_clean_not_found() {
        let result = load_transcript(Path::new("/tmp/does_not_exist_dentascribe_12345.txt"));
        match result {
            Err(ArchiveError::NotFound(path)) => {
                assert!(path.to_string_lossy().contains("does_not_exist"));
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn not_found_display_is_clear() {
        let err = ArchiveError::NotFound(PathBuf::from("/tmp/missing.txt"));
        let display = err.to_string();
        assert!(display.contains("not found"));
        assert!(display.contains("/tmp/missing.txt"));
    }

    #[test]
    fn output_dir_is_created_on_demand() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("notes").join("2026");
        let settings = settings_in(&nested);

        let path = save_transcript(&settings, "text").unwrap();
        assert!(path.starts_with(&nested));
    }
}
