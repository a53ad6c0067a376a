//! Speech-to-text transcription via the OpenAI Whisper API.

mod openai;

pub use openai::{audio_mime, transcribe_audio, TranscriptionError};
