//! Chat Completions client for SOAP note generation.
//!
//! Sends the system prompt + transcript message pair and returns the
//! generated markdown note. Rate-limit responses (429) are retried with
//! exponential backoff; every other failure is terminal.

use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use super::prompt;
use crate::api_key;
use crate::settings::AppSettings;

/// OpenAI Chat Completions API endpoint.
const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Maximum retries on rate limit errors.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const BASE_DELAY_MS: u64 = 1000;

static HTTP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .expect("Failed to build HTTP client")
});

/// Errors that can occur during note generation
#[derive(Debug)]
pub enum NoteError {
    /// OpenAI API key not configured
    MissingApiKey,
    /// Nothing to document
    EmptyTranscript,
    /// Network/HTTP error
    Network(String),
    /// OpenAI API returned an error
    Api { status: u16, message: String },
    /// Failed to parse API response
    Parse(String),
    /// The API returned no choices
    EmptyResponse,
}

impl std::fmt::Display for NoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoteError::MissingApiKey => {
                write!(
                    f,
                    "OpenAI API key not configured. Set OPENAI_API_KEY or run `dentascribe key set`."
                )
            }
            NoteError::EmptyTranscript => {
                write!(f, "Transcript is empty; nothing to document")
            }
            NoteError::Network(e) => write!(f, "Network error: {}", e),
            NoteError::Api { status, message } => {
                write!(f, "OpenAI API error ({}): {}", status, message)
            }
            NoteError::Parse(e) => write!(f, "Failed to parse API response: {}", e),
            NoteError::EmptyResponse => write!(f, "No note was generated (empty API response)"),
        }
    }
}

impl std::error::Error for NoteError {}

/// Request body for Chat Completions API.
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

/// Chat message structure.
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

/// Response from Chat Completions API.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Error response from OpenAI.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Generate a SOAP note from a consultation transcript.
///
/// Model and temperature come from settings; the documentation date is
/// today's local date.
pub async fn generate_note(transcript: &str, settings: &AppSettings) -> Result<String, NoteError> {
    if transcript.trim().is_empty() {
        return Err(NoteError::EmptyTranscript);
    }

    let api_key = api_key::resolve_api_key().ok_or(NoteError::MissingApiKey)?;

    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let request = ChatRequest {
        model: settings.chat_model.clone(),
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: prompt::build_system_prompt(&today),
            },
            ChatMessage {
                role: "user".to_string(),
                content: prompt::build_user_message(transcript),
            },
        ],
        temperature: settings.temperature,
    };

    let mut last_error = NoteError::EmptyResponse;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s
            let delay = BASE_DELAY_MS * 2u64.pow(attempt - 1);
            debug!(attempt, delay_ms = delay, "retrying after rate limit");
            sleep(Duration::from_millis(delay)).await;
        }

        match make_request(&api_key, &request).await {
            Ok(note) => {
                debug!(
                    transcript_chars = transcript.len(),
                    note_chars = note.len(),
                    "note generation succeeded"
                );
                return Ok(note);
            }
            Err(err) => {
                let retryable = matches!(err, NoteError::Api { status: 429, .. });
                if retryable {
                    warn!(attempt, error = %err, "rate limit hit, will retry");
                    last_error = err;
                    continue;
                }

                error!(error = %err, "note generation failed");
                return Err(err);
            }
        }
    }

    Err(last_error)
}

/// Make the actual HTTP request to OpenAI.
async fn make_request(api_key: &str, request: &ChatRequest) -> Result<String, NoteError> {
    let response = HTTP_CLIENT
        .post(CHAT_COMPLETIONS_URL)
        .header("Authorization", format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .json(request)
        .send()
        .await
        .map_err(|e| NoteError::Network(e.to_string()))?;

    let status = response.status();

    if status.is_success() {
        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| NoteError::Parse(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|note| !note.is_empty())
            .ok_or(NoteError::EmptyResponse)
    } else {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        let message = if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text)
        {
            error_response.error.message
        } else {
            error_text
        };

        Err(NoteError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_transcript_is_rejected_before_any_network_call() {
        let settings = AppSettings::default();
        let result = generate_note("   \n ", &settings).await;
        assert!(matches!(result, Err(NoteError::EmptyTranscript)));
    }

    #[test]
    fn error_display_formats() {
        let err = NoteError::Api {
            status: 429,
            message: "Rate limit reached".to_string(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Rate limit reached"));

        assert!(NoteError::MissingApiKey.to_string().contains("OPENAI_API_KEY"));
        assert!(NoteError::EmptyResponse.to_string().contains("empty"));
    }

    #[test]
    fn only_429_is_retryable() {
        let rate_limited = NoteError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(matches!(rate_limited, NoteError::Api { status: 429, .. }));

        let server_error = NoteError::Api {
            status: 500,
            message: "oops".to_string(),
        };
        assert!(!matches!(server_error, NoteError::Api { status: 429, .. }));
    }
}
