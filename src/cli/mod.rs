//! Command-line surface: argument definitions and one-shot commands.

pub mod args;
pub mod key;
pub mod note;
pub mod transcribe;
