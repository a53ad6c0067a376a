//! CLI argument definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Dental consultation transcription and SOAP note assistant
#[derive(Parser)]
#[command(name = "dentascribe")]
#[command(about = "Transcribe dental consultations and generate SOAP notes", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the interactive consultation session (default)
    Session,
    /// Transcribe an audio file and print or save the transcript
    Transcribe(TranscribeArgs),
    /// Generate a SOAP note from a transcript file
    Note(NoteArgs),
    /// Manage the OpenAI API key stored in the system keyring
    Key(KeyArgs),
}

#[derive(Parser)]
pub struct TranscribeArgs {
    /// Path to the audio file (wav, mp3, m4a, ogg)
    pub input: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the Whisper model from settings
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Parser)]
pub struct NoteArgs {
    /// Path to the transcript text file
    pub transcript: PathBuf,

    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Override the chat model from settings
    #[arg(long)]
    pub model: Option<String>,
}

#[derive(Parser)]
pub struct KeyArgs {
    #[command(subcommand)]
    pub action: KeyAction,
}

#[derive(Subcommand)]
pub enum KeyAction {
    /// Read an API key from stdin and store it in the system keyring
    Set,
    /// Delete the stored API key
    Clear,
    /// Show whether a key is configured, and where it comes from
    Status,
}
