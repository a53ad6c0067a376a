//! SOAP note generation from a consultation transcript.
//!
//! Builds a fixed instructional prompt around the transcript and delegates
//! the actual writing to the OpenAI Chat Completions API. The note comes
//! back as markdown and is not validated beyond being non-empty.

mod generator;
pub mod prompt;

pub use generator::{generate_note, NoteError};
