//! OpenAI Whisper API client for speech-to-text transcription.
//!
//! Uploads a consultation audio file (WAV from the recorder, or any format
//! the clinic hands us) and returns the transcript text.

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use crate::api_key;

const TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Global HTTP client for reuse across requests (avoids TLS handshake overhead)
static HTTP_CLIENT: OnceLock<Client> = OnceLock::new();

fn http_client() -> &'static Client {
    HTTP_CLIENT.get_or_init(|| {
        Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("Failed to build HTTP client")
    })
}

/// Errors that can occur during transcription
#[derive(Debug)]
pub enum TranscriptionError {
    /// OpenAI API key not configured
    MissingApiKey,
    /// Audio file missing or unreadable
    FileRead { path: String, detail: String },
    /// Audio format we don't know how to upload
    UnsupportedFormat(String),
    /// Network/HTTP error
    Network(String),
    /// OpenAI API returned an error
    Api { status: u16, message: String },
    /// Failed to parse API response
    Parse(String),
}

impl std::fmt::Display for TranscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionError::MissingApiKey => {
                write!(
                    f,
                    "OpenAI API key not configured. Set OPENAI_API_KEY or run `dentascribe key set`."
                )
            }
            TranscriptionError::FileRead { path, detail } => {
                write!(f, "Audio file not found or unreadable: {} ({})", path, detail)
            }
            TranscriptionError::UnsupportedFormat(ext) => {
                write!(
                    f,
                    "Unsupported audio format '{}' (expected wav, mp3, m4a or ogg)",
                    ext
                )
            }
            TranscriptionError::Network(e) => write!(f, "Network error: {}", e),
            TranscriptionError::Api { status, message } => {
                write!(f, "OpenAI API error ({}): {}", status, message)
            }
            TranscriptionError::Parse(e) => write!(f, "Failed to parse API response: {}", e),
        }
    }
}

impl std::error::Error for TranscriptionError {}

/// Whisper API response (plain `json` response format)
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

/// OpenAI API error response
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Mime type for an audio file, by extension.
/// Upload formats match what the clinic tooling produces: wav (our recorder),
/// mp3/m4a (phone memos), ogg.
pub fn audio_mime(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "wav" => Some("audio/wav"),
        "mp3" => Some("audio/mpeg"),
        "m4a" => Some("audio/mp4"),
        "ogg" => Some("audio/ogg"),
        _ => None,
    }
}

/// Transcribe a consultation audio file using the OpenAI Whisper API.
///
/// Returns the transcript text on success. A missing or unreadable file is
/// reported as `FileRead` rather than panicking.
pub async fn transcribe_audio(
    audio_path: &Path,
    model: &str,
) -> Result<String, TranscriptionError> {
    let api_key = api_key::resolve_api_key().ok_or(TranscriptionError::MissingApiKey)?;

    let mime = audio_mime(audio_path).ok_or_else(|| {
        let ext = audio_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_string();
        TranscriptionError::UnsupportedFormat(ext)
    })?;

    let file_bytes = tokio::fs::read(audio_path)
        .await
        .map_err(|e| TranscriptionError::FileRead {
            path: audio_path.display().to_string(),
            detail: e.to_string(),
        })?;

    let filename = audio_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("audio.wav")
        .to_string();

    tracing::info!(
        file = %filename,
        bytes = file_bytes.len(),
        model,
        "transcribing consultation audio"
    );

    let file_part = Part::bytes(file_bytes)
        .file_name(filename)
        .mime_str(mime)
        .map_err(|e| TranscriptionError::Parse(e.to_string()))?;

    let form = Form::new()
        .part("file", file_part)
        .text("model", model.to_string())
        .text("response_format", "json")
        .text("temperature", "0");

    let response = http_client()
        .post(TRANSCRIPTION_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .multipart(form)
        .send()
        .await
        .map_err(|e| TranscriptionError::Network(e.to_string()))?;

    let status = response.status();

    if status.is_success() {
        let whisper_response: WhisperResponse = response
            .json()
            .await
            .map_err(|e| TranscriptionError::Parse(e.to_string()))?;

        tracing::info!(chars = whisper_response.text.len(), "transcription successful");

        Ok(whisper_response.text)
    } else {
        let error_text = response.text().await.unwrap_or_default();

        let message =
            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                error_response.error.message
            } else {
                error_text
            };

        tracing::error!(status = status.as_u16(), %message, "OpenAI API error");

        Err(TranscriptionError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_api_key_error_mentions_both_sources() {
        let err = TranscriptionError::MissingApiKey;
        assert!(err.to_string().contains("OPENAI_API_KEY"));
        assert!(err.to_string().contains("key set"));
    }

    #[test]
    fn api_error_display_includes_status_and_message() {
        let err = TranscriptionError::Api {
            status: 401,
            message: "Invalid API key".to_string(),
        };
        assert!(err.to_string().contains("401"));
        assert!(err.to_string().contains("Invalid API key"));
    }

    #[test]
    fn file_read_error_names_the_file() {
        let err = TranscriptionError::FileRead {
            path: "/tmp/missing.wav".to_string(),
            detail: "No such file or directory".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("not found"));
        assert!(display.contains("/tmp/missing.wav"));
    }

    #[test]
    fn mime_by_extension() {
        assert_eq!(
            audio_mime(&PathBuf::from("consult.wav")),
            Some("audio/wav")
        );
        assert_eq!(
            audio_mime(&PathBuf::from("consult.MP3")),
            Some("audio/mpeg")
        );
        assert_eq!(
            audio_mime(&PathBuf::from("consult.m4a")),
            Some("audio/mp4")
        );
        assert_eq!(audio_mime(&PathBuf::from("consult.ogg")), Some("audio/ogg"));
        assert_eq!(audio_mime(&PathBuf::from("consult.txt")), None);
        assert_eq!(audio_mime(&PathBuf::from("noextension")), None);
    }
}
