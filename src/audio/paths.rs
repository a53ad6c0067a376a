//! Path helpers for consultation recordings.
//!
//! WAV files are stored in: `<data_local_dir>/dentascribe/recordings/`

use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

const MAX_RECORDINGS: usize = 10;

/// Get the recordings directory path.
fn recordings_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dentascribe")
        .join("recordings")
}

/// Create the recordings directory if it doesn't exist.
pub fn create_recordings_dir() -> std::io::Result<PathBuf> {
    let dir = recordings_dir();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Generate a unique WAV file path for a consultation recording.
/// Format: `<timestamp>_<consult_id>.wav`
pub fn generate_wav_path(consult_id: Uuid) -> std::io::Result<PathBuf> {
    let dir = create_recordings_dir()?;
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let filename = format!("{}_{}.wav", timestamp, consult_id);
    Ok(dir.join(filename))
}

/// Clean up old recordings, keeping only the most recent N files.
pub fn cleanup_old_recordings() -> std::io::Result<usize> {
    let dir = recordings_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let mut entries: Vec<_> = fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "wav")
                .unwrap_or(false)
        })
        .collect();

    if entries.len() <= MAX_RECORDINGS {
        return Ok(0);
    }

    // Sort by modified time (oldest first)
    entries.sort_by(|a, b| {
        let time_a = a.metadata().and_then(|m| m.modified()).ok();
        let time_b = b.metadata().and_then(|m| m.modified()).ok();
        time_a.cmp(&time_b)
    });

    let to_delete = entries.len() - MAX_RECORDINGS;
    let mut deleted = 0;

    for entry in entries.into_iter().take(to_delete) {
        if fs::remove_file(entry.path()).is_ok() {
            tracing::debug!("cleaned up old recording: {:?}", entry.path());
            deleted += 1;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_path_contains_consult_id_and_wav_extension() {
        let id = Uuid::new_v4();
        let path = generate_wav_path(id).unwrap();
        assert!(path.to_string_lossy().contains(&id.to_string()));
        assert!(path.extension().map(|e| e == "wav").unwrap_or(false));
    }

    #[test]
    fn recordings_dir_contains_expected_components() {
        let dir = recordings_dir();
        let path_str = dir.to_string_lossy();
        assert!(path_str.contains("dentascribe"));
        assert!(path_str.contains("recordings"));
    }
}
